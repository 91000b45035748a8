//! Property-based tests for the fact data model and dedup invariants.

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use crate::fact::types::{content_hash, AssertionType, Claim, ClaimType, ExtractedFact, Provenance};
    use crate::investigation::InvestigationId;
    use crate::store::FactStore;
    use crate::web::normalize;

    fn claim_text() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 ,.]{1,120}"
    }

    fn fact(text: &str, source: &str) -> ExtractedFact {
        ExtractedFact::new(
            Claim {
                text: text.to_string(),
                assertion_type: AssertionType::Statement,
                claim_type: ClaimType::Event,
                asserter: None,
            },
            Provenance::new(source, "rss"),
            "prop-model",
        )
    }

    proptest! {
        /// The content hash is a pure function of the claim text.
        #[test]
        fn content_hash_is_reproducible(text in claim_text()) {
            let a = content_hash(&text);
            let b = content_hash(&text);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.len(), 64);
            prop_assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        }

        /// A constructed fact always satisfies the hash invariant.
        #[test]
        fn constructed_facts_validate(text in claim_text()) {
            let f = fact(&text, "rss:src");
            prop_assert_eq!(&f.content_hash, &content_hash(&f.claim.text));
            prop_assert!(f.validate().is_ok());
        }

        /// URL normalization is idempotent over simple well-formed URLs.
        #[test]
        fn url_normalization_is_idempotent(
            host in "[a-z]{2,12}",
            path in "[a-z0-9/]{0,24}",
            param in "[a-z]{1,8}",
            value in "[a-z0-9]{0,8}",
        ) {
            let url = format!("https://{host}.example.com/{path}?{param}={value}");
            if let Ok(once) = normalize(&url) {
                let twice = normalize(&once).unwrap();
                prop_assert_eq!(once, twice);
            }
        }

        /// Hash-equal facts linked as variants are always symmetric.
        #[test]
        fn variant_links_are_symmetric(text in claim_text()) {
            let store = FactStore::new();
            let inv = InvestigationId::new();
            let a = fact(&text, "rss:a");
            let b = fact(&text, "rss:b");
            let (a_id, b_id) = (a.fact_id, b.fact_id);

            store.insert(inv, a).unwrap();
            store.insert(inv, b).unwrap();
            store.link_variant(a_id, b_id).unwrap();

            let a = store.get(a_id).unwrap();
            let b = store.get(b_id).unwrap();
            prop_assert!(a.variants.contains(&b_id));
            prop_assert!(b.variants.contains(&a_id));
            prop_assert!(store.verify_integrity().is_ok());
        }
    }
}
