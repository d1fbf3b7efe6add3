//! Slug-safe path helpers.
//!
//! Repository paths are built from slugs: segments restricted to characters
//! that survive URL form-encoding unchanged. Every path handled by the
//! changeset model is relative to the preserved object's root and uses `/`
//! as separator.

use url::form_urlencoded;

/// Characters form-encoding escapes that slugs may still carry.
const EXTRA_SAFE: &[(&str, &str)] = &[("%21", "!"), ("%28", "("), ("%29", ")")];

/// `true` when `slug` is unchanged by URL form-encoding, counting `!`, `(`
/// and `)` as safe.
pub fn valid_slug(slug: &str) -> bool {
    let encoded: String = form_urlencoded::byte_serialize(slug.as_bytes()).collect();
    let encoded = EXTRA_SAFE
        .iter()
        .fold(encoded, |acc, (escaped, plain)| acc.replace(escaped, plain));
    encoded == slug
}

/// `true` when every `/`-delimited segment of `path` is a valid slug.
pub fn valid_path(path: &str) -> bool {
    path.split('/').all(valid_slug)
}

/// `true` when `path` is a valid path with no empty segments.
///
/// This is the stricter form used before anything is sent to the repository:
/// `a//b`, `/a` and the empty string are rejected.
pub fn well_formed_path(path: &str) -> bool {
    !path.is_empty() && valid_path(path) && path.split('/').all(|s| !s.is_empty())
}

/// Number of segments in `path` (`"a/b/c"` → 3).
pub fn depth(path: &str) -> usize {
    if path.is_empty() {
        0
    } else {
        path.split('/').count()
    }
}

/// Join a parent path and a child segment, treating an empty parent as root.
pub fn join(parent: &str, child: &str) -> String {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_start_matches('/');
    if parent.is_empty() {
        child.to_string()
    } else if child.is_empty() {
        parent.to_string()
    } else {
        format!("{parent}/{child}")
    }
}

/// A path split into its last segment and the path of its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAndParent<'a> {
    pub name: &'a str,
    /// `None` when the path has a single segment.
    pub parent: Option<&'a str>,
}

impl<'a> NameAndParent<'a> {
    pub fn split(path: &'a str) -> Self {
        match path.rsplit_once('/') {
            Some((parent, name)) => Self {
                name,
                parent: Some(parent),
            },
            None => Self {
                name: path,
                parent: None,
            },
        }
    }
}

/// Every proper ancestor of `path`, nearest first (`"a/b/c"` → `["a/b", "a"]`).
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path;
    while let Some((parent, _)) = current.rsplit_once('/') {
        if parent.is_empty() {
            break;
        }
        out.push(parent);
        current = parent;
    }
    out
}

/// `"Name (/slug)"` when the display name differs from the slug, else the name.
pub fn display_name(name: &str, slug: &str) -> String {
    if name == slug {
        name.to_string()
    } else {
        format!("{name} (/{slug})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("readme.txt", true)]
    #[case("page-001_v2.tiff", true)]
    #[case("with space", false)]
    #[case("caf\u{e9}", false)]
    #[case("a&b", false)]
    #[case("page(1).jpg", true)]
    #[case("wow!*", true)]
    #[case("100%21", false)]
    #[case("", true)]
    fn slug_safety(#[case] slug: &str, #[case] expected: bool) {
        assert_eq!(valid_slug(slug), expected, "slug: {slug:?}");
    }

    #[rstest]
    #[case("objects/page1.jpg", true)]
    #[case("objects/page 1.jpg", false)]
    #[case("a/b/c", true)]
    #[case("a/b%20/c", false)]
    fn path_safety(#[case] path: &str, #[case] expected: bool) {
        assert_eq!(valid_path(path), expected, "path: {path:?}");
    }

    #[test]
    fn well_formed_rejects_empty_segments() {
        assert!(well_formed_path("a/b"));
        assert!(!well_formed_path(""));
        assert!(!well_formed_path("a//b"));
        assert!(!well_formed_path("/a"));
        assert!(!well_formed_path("a/"));
    }

    #[test]
    fn split_name_and_parent() {
        let np = NameAndParent::split("objects/sub/page.jpg");
        assert_eq!(np.name, "page.jpg");
        assert_eq!(np.parent, Some("objects/sub"));

        let top = NameAndParent::split("mets.xml");
        assert_eq!(top.name, "mets.xml");
        assert_eq!(top.parent, None);
    }

    #[test]
    fn ancestors_nearest_first() {
        assert_eq!(ancestors("a/b/c.txt"), vec!["a/b", "a"]);
        assert!(ancestors("c.txt").is_empty());
    }

    #[test]
    fn join_treats_empty_parent_as_root() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("col/obj", "a/b"), "col/obj/a/b");
        assert_eq!(join("col/obj/", "/a"), "col/obj/a");
    }

    #[test]
    fn display_name_mentions_slug_only_when_different() {
        assert_eq!(display_name("foo", "foo"), "foo");
        assert_eq!(display_name("Page One", "page-1"), "Page One (/page-1)");
    }

    #[test]
    fn depth_counts_segments() {
        assert_eq!(depth(""), 0);
        assert_eq!(depth("a"), 1);
        assert_eq!(depth("a/b/c"), 3);
    }
}
