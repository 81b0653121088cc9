use promptjudge_content::{normalize, ContentReference, Namespace, Version};
use proptest::prelude::*;

fn name() -> impl Strategy<Value = String> {
    "[a-z0-9][a-z0-9_-]{0,8}"
}

fn path() -> impl Strategy<Value = String> {
    (
        proptest::collection::vec("[A-Za-z0-9_-]{1,8}", 0..3),
        "[A-Za-z0-9_-]{1,8}",
        prop_oneof![Just(""), Just(".md"), Just(".yaml"), Just(".rs")],
    )
        .prop_map(|(dirs, stem, ext)| {
            let mut segments = dirs;
            segments.push(format!("{}{}", stem, ext));
            segments.join("/")
        })
}

/// Version suffix as written, and what it should parse to
fn version() -> impl Strategy<Value = (Option<String>, Version)> {
    prop_oneof![
        Just((None, Version::Latest)),
        Just((Some("latest".to_string()), Version::Latest)),
        "[0-9a-f]{7,40}".prop_map(|id| (Some(id.clone()), Version::Commit(id))),
        "[0-9A-F]{7,40}".prop_map(|id| {
            let lower = id.to_ascii_lowercase();
            (Some(id), Version::Commit(lower))
        }),
        "[g-z][a-z0-9._-]{0,10}(/[a-z0-9]{1,6})?"
            .prop_filter("reserved name", |name| name != "latest")
            .prop_map(|name| (Some(name.clone()), Version::Named(name))),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn test_normalized_form_round_trips(
        owner in name(),
        collection in name(),
        explicit in any::<bool>(),
        path in path(),
        decorate in any::<bool>(),
        (suffix, expected_version) in version(),
    ) {
        let current = Namespace::new("acme", "prompts");
        let namespace = if explicit {
            Namespace::new(owner, collection)
        } else {
            current.clone()
        };

        let mut input = String::new();
        if explicit {
            input.push_str(&format!("{}:", namespace));
        }
        if decorate {
            input.push_str("./");
        }
        input.push_str(&path);
        if let Some(suffix) = &suffix {
            input.push('@');
            input.push_str(suffix);
        }
        if decorate {
            input = format!("  {}  ", input);
        }

        let parsed = ContentReference::parse(&input, &current)?;
        prop_assert_eq!(&parsed.namespace, &namespace);
        prop_assert_eq!(&parsed.path, &path);
        prop_assert_eq!(&parsed.version, &expected_version);

        let normalized = normalize(&input, &current)?;
        prop_assert_eq!(&normalized, &parsed.to_string());

        // The normalized form carries its namespace and is a fixed point
        let elsewhere = Namespace::new("other", "repo");
        prop_assert_eq!(ContentReference::parse(&normalized, &elsewhere)?, parsed.clone());
        prop_assert_eq!(normalize(&normalized, &elsewhere)?, normalized.clone());
        prop_assert_eq!(
            ContentReference::parse(&normalized, &current)?.cache_key(),
            parsed.cache_key()
        );
    }
}

#[test]
fn test_pinned_and_floating_versions() {
    let current = Namespace::new("acme", "prompts");
    let pinned = ContentReference::parse("docs/a.md@3F2C1AB", &current).unwrap();
    assert!(pinned.version.is_pinned());
    assert_eq!(pinned.to_string(), "acme/prompts:docs/a.md@3f2c1ab");

    let floating = ContentReference::parse("docs/a.md@main", &current).unwrap();
    assert!(!floating.version.is_pinned());
    assert_ne!(pinned.cache_key(), floating.cache_key());
}
