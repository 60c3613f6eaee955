//! Maps changed resource paths to the page they belong to.
//!
//! A change fires on whatever descendant node was touched (a property three
//! levels below `jcr:content`, a child component, ...). The rendered artifact
//! that goes stale is the page root, so the resolver anchors on the path
//! structure `<root>/<category>/<id>/...` and throws the descendant part away.

use std::fmt;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use super::config::InvalidationConfig;

const ID_CLASS: &str = "[A-Za-z0-9_-]";

/// Canonical root path of a renderable page-like unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PageIdentity(String);

impl PageIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for PageIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PageIdentity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum ResolverError {
    #[error("at least one category is required to resolve page paths")]
    NoCategories,
    #[error("failed to compile page path pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Resolves change paths to [`PageIdentity`] values.
#[derive(Debug, Clone)]
pub struct PathResolver {
    pattern: Regex,
}

impl PathResolver {
    /// Compile the page pattern for the configured root and categories.
    pub fn new(config: &InvalidationConfig) -> Result<Self, ResolverError> {
        if config.categories.is_empty() {
            return Err(ResolverError::NoCategories);
        }

        let categories = config
            .categories
            .iter()
            .map(|category| regex::escape(category))
            .collect::<Vec<_>>()
            .join("|");
        // `/` as root would otherwise produce a `//` prefix.
        let root = config.watch_root.trim_end_matches('/');
        let source = format!(
            "^({root}/(?:{categories})/{ID_CLASS}{{1,{max}}}).*/.*$",
            root = regex::escape(root),
            max = config.max_id_len,
        );

        Ok(Self {
            pattern: Regex::new(&source)?,
        })
    }

    /// Resolve `path` to its page identity, or `None` when the change does not
    /// belong to a tracked page. Never fails.
    pub fn resolve(&self, path: &str) -> Option<PageIdentity> {
        self.pattern
            .captures(path)
            .and_then(|captures| captures.get(1))
            .map(|page| PageIdentity(page.as_str().to_string()))
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> PathResolver {
        PathResolver::new(&InvalidationConfig::default()).expect("default pattern compiles")
    }

    fn resolved(path: &str) -> Option<String> {
        resolver().resolve(path).map(PageIdentity::into_string)
    }

    #[test]
    fn resolves_deep_descendant_to_page_root() {
        assert_eq!(
            resolved("/content/layout-wcm/headers/global/jcr:content/title").as_deref(),
            Some("/content/layout-wcm/headers/global")
        );
        assert_eq!(
            resolved("/content/layout-wcm/footers/main_01/jcr:content/root/par/text/jcr:title")
                .as_deref(),
            Some("/content/layout-wcm/footers/main_01")
        );
    }

    #[test]
    fn resolves_direct_child() {
        assert_eq!(
            resolved("/content/layout-wcm/headers/global/jcr:content").as_deref(),
            Some("/content/layout-wcm/headers/global")
        );
    }

    #[test]
    fn page_root_without_leaf_does_not_match() {
        assert_eq!(resolved("/content/layout-wcm/headers/global"), None);
    }

    #[test]
    fn trailing_slash_is_an_empty_leaf() {
        assert_eq!(
            resolved("/content/layout-wcm/headers/global/").as_deref(),
            Some("/content/layout-wcm/headers/global")
        );
    }

    #[test]
    fn unknown_category_does_not_match() {
        assert_eq!(resolved("/content/layout-wcm/sidebars/global/jcr:content"), None);
        assert_eq!(resolved("/content/other-app/x/y"), None);
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(resolved("/content/layout-wcm/Headers/global/jcr:content"), None);
        assert_eq!(resolved("/Content/layout-wcm/headers/global/jcr:content"), None);
    }

    #[test]
    fn root_lookalike_does_not_match() {
        assert_eq!(resolved("/content/layout-wcm2/headers/global/jcr:content"), None);
        assert_eq!(resolved("/etc/content/layout-wcm/headers/global/x"), None);
    }

    #[test]
    fn identifier_character_class_is_enforced() {
        assert_eq!(resolved("/content/layout-wcm/headers//jcr:content"), None);
        assert_eq!(resolved("/content/layout-wcm/headers/.hidden/jcr:content"), None);
        assert_eq!(
            resolved("/content/layout-wcm/headers/A-z_9/x").as_deref(),
            Some("/content/layout-wcm/headers/A-z_9")
        );
    }

    #[test]
    fn identifier_stops_at_first_disallowed_character() {
        assert_eq!(
            resolved("/content/layout-wcm/headers/global.html/x").as_deref(),
            Some("/content/layout-wcm/headers/global")
        );
        assert_eq!(
            resolved("/content/layout-wcm/headers/glo bal/jcr:content").as_deref(),
            Some("/content/layout-wcm/headers/glo")
        );
        assert_eq!(resolved("/content/layout-wcm/headers/global.html"), None);
    }

    #[test]
    fn identifier_length_is_bounded() {
        let longest = "a".repeat(99);
        let too_long = "a".repeat(100);

        assert_eq!(
            resolved(&format!("/content/layout-wcm/headers/{longest}/x")),
            Some(format!("/content/layout-wcm/headers/{longest}"))
        );
        assert_eq!(
            resolved(&format!("/content/layout-wcm/headers/{too_long}/x")),
            Some(format!("/content/layout-wcm/headers/{longest}"))
        );
    }

    #[test]
    fn empty_and_garbage_input_never_match() {
        assert_eq!(resolved(""), None);
        assert_eq!(resolved("/"), None);
        assert_eq!(resolved("not a path"), None);
    }

    #[test]
    fn newline_in_leaf_does_not_match() {
        assert_eq!(resolved("/content/layout-wcm/headers/global/a\nb"), None);
    }

    #[test]
    fn root_and_categories_are_literal() {
        let config = InvalidationConfig {
            watch_root: "/content/site.v2".to_string(),
            categories: vec!["nav+menus".to_string()],
            ..Default::default()
        };
        let resolver = PathResolver::new(&config).expect("pattern compiles");

        assert_eq!(
            resolver
                .resolve("/content/site.v2/nav+menus/top/jcr:content")
                .map(PageIdentity::into_string)
                .as_deref(),
            Some("/content/site.v2/nav+menus/top")
        );
        assert_eq!(resolver.resolve("/content/siteXv2/navvmenus/top/jcr:content"), None);
    }

    #[test]
    fn slash_root_matches_top_level_categories() {
        let config = InvalidationConfig {
            watch_root: "/".to_string(),
            ..Default::default()
        };
        let resolver = PathResolver::new(&config).expect("pattern compiles");

        assert_eq!(
            resolver
                .resolve("/headers/global/jcr:content/title")
                .map(PageIdentity::into_string)
                .as_deref(),
            Some("/headers/global")
        );
        assert!(!resolver.pattern().contains("//"));
    }

    #[test]
    fn empty_category_list_is_rejected() {
        let config = InvalidationConfig {
            categories: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(
            PathResolver::new(&config),
            Err(ResolverError::NoCategories)
        ));
    }

    #[test]
    fn zero_identifier_length_is_rejected() {
        let config = InvalidationConfig {
            max_id_len: 0,
            ..Default::default()
        };
        assert!(matches!(
            PathResolver::new(&config),
            Err(ResolverError::Pattern(_))
        ));
    }
}
