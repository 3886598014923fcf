use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const UNTITLED_PRODUCT: &str = "Untitled Product";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StartupId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FounderId(pub u64);

/// Karma awarded to a startup; recency drives the activity queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KarmaPoint {
    pub points: i32,
    pub created_at: DateTime<Utc>,
}

/// An admitted (or admitting) team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Startup {
    pub id: StartupId,
    pub product_name: String,
    #[serde(default)]
    pub legal_registered_name: Option<String>,
    pub slug: String,
    pub level_number: u32,
    #[serde(default)]
    pub dropped_out: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub founder_ids: Vec<FounderId>,
    #[serde(default)]
    pub karma_points: Vec<KarmaPoint>,
}

/// Input for [`Startup::build`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NewStartup {
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub legal_registered_name: Option<String>,
    pub level_number: u32,
    #[serde(default)]
    pub tags: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartupError {
    #[error("level cannot be assigned to level zero")]
    LevelZero,
    #[error("slug '{0}' may only contain letters, digits, '-' and '_'")]
    InvalidSlug(String),
    #[error("startup {id:?} still has {founders} founder(s) and cannot be deleted")]
    HasFounders { id: StartupId, founders: usize },
    #[error("startup {id:?} has karma history and cannot be deleted")]
    HasKarma { id: StartupId },
}

impl Startup {
    /// Construct a startup: default the product name, check the level, then pick a slug that
    /// is not in `taken_slugs` (product name first, then product name with the id).
    pub fn build(
        id: StartupId,
        input: NewStartup,
        taken_slugs: &BTreeSet<String>,
    ) -> Result<Self, StartupError> {
        let product_name = input
            .product_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNTITLED_PRODUCT.to_string());

        if input.level_number == 0 {
            return Err(StartupError::LevelZero);
        }

        let base = parameterize(&product_name);
        let slug = if base.is_empty() {
            id.0.to_string()
        } else if taken_slugs.contains(&base) {
            format!("{base}-{}", id.0)
        } else {
            base
        };
        ensure_slug(&slug)?;

        Ok(Self {
            id,
            product_name,
            legal_registered_name: input
                .legal_registered_name
                .filter(|name| !name.trim().is_empty()),
            slug,
            level_number: input.level_number,
            dropped_out: false,
            tags: input.tags,
            founder_ids: Vec::new(),
            karma_points: Vec::new(),
        })
    }

    pub fn is_admitted(&self) -> bool {
        self.level_number > 0
    }

    pub fn is_approved(&self) -> bool {
        !self.dropped_out
    }

    pub fn display_name(&self) -> String {
        match &self.legal_registered_name {
            Some(name) => format!("{} ({name})", self.product_name),
            None => self.product_name.clone(),
        }
    }

    pub fn is_founder(&self, founder: FounderId) -> bool {
        self.founder_ids.contains(&founder)
    }

    /// Every founder other than `founder`.
    pub fn cofounders(&self, founder: FounderId) -> Vec<FounderId> {
        self.founder_ids
            .iter()
            .copied()
            .filter(|id| *id != founder)
            .collect()
    }

    /// Deletion is refused while founders or karma history still reference the startup.
    pub fn ensure_deletable(&self) -> Result<(), StartupError> {
        if !self.founder_ids.is_empty() {
            return Err(StartupError::HasFounders {
                id: self.id,
                founders: self.founder_ids.len(),
            });
        }
        if !self.karma_points.is_empty() {
            return Err(StartupError::HasKarma { id: self.id });
        }
        Ok(())
    }
}

/// Lowercase ASCII slug: alphanumerics kept, runs of anything else collapsed into one `-`.
pub fn parameterize(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn ensure_slug(slug: &str) -> Result<(), StartupError> {
    let valid = !slug.is_empty()
        && slug
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(StartupError::InvalidSlug(slug.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(name: Option<&str>) -> NewStartup {
        NewStartup {
            product_name: name.map(str::to_string),
            level_number: 1,
            ..NewStartup::default()
        }
    }

    #[test]
    fn parameterize_collapses_separators() {
        assert_eq!(parameterize("  Super  Product! 2.0 "), "super-product-2-0");
        assert_eq!(parameterize("***"), "");
    }

    #[test]
    fn build_defaults_product_name_and_slugs_it() {
        let startup =
            Startup::build(StartupId(7), input(None), &BTreeSet::new()).expect("builds");
        assert_eq!(startup.product_name, "Untitled Product");
        assert_eq!(startup.slug, "untitled-product");
        assert!(startup.is_admitted());
        assert!(startup.is_approved());
    }

    #[test]
    fn build_appends_id_when_slug_taken() {
        let taken: BTreeSet<String> = ["acme".to_string()].into_iter().collect();
        let startup = Startup::build(StartupId(42), input(Some("Acme")), &taken).expect("builds");
        assert_eq!(startup.slug, "acme-42");
    }

    #[test]
    fn build_rejects_level_zero() {
        let mut request = input(Some("Acme"));
        request.level_number = 0;
        assert_eq!(
            Startup::build(StartupId(1), request, &BTreeSet::new()),
            Err(StartupError::LevelZero)
        );
    }

    #[test]
    fn display_name_includes_legal_name() {
        let mut request = input(Some("Acme"));
        request.legal_registered_name = Some("Acme Private Limited".to_string());
        let startup = Startup::build(StartupId(1), request, &BTreeSet::new()).expect("builds");
        assert_eq!(startup.display_name(), "Acme (Acme Private Limited)");
    }

    #[test]
    fn deletion_restricted_by_founders_then_karma() {
        let mut startup =
            Startup::build(StartupId(3), input(Some("Acme")), &BTreeSet::new()).expect("builds");
        startup.founder_ids = vec![FounderId(1), FounderId(2)];
        assert_eq!(startup.cofounders(FounderId(1)), vec![FounderId(2)]);
        assert!(startup.is_founder(FounderId(2)));
        assert!(matches!(
            startup.ensure_deletable(),
            Err(StartupError::HasFounders { founders: 2, .. })
        ));

        startup.founder_ids.clear();
        startup.karma_points.push(KarmaPoint {
            points: 10,
            created_at: Utc::now(),
        });
        assert!(matches!(
            startup.ensure_deletable(),
            Err(StartupError::HasKarma { .. })
        ));

        startup.karma_points.clear();
        assert!(startup.ensure_deletable().is_ok());
    }
}
