// ABOUTME: Integration tests for validated names, bundle ids and typed identifiers.
// ABOUTME: Tests parsing, validation, ordering and serde behaviour.

use bulwark::types::*;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

mod component_name_tests {
    use super::*;

    #[test]
    fn valid_dns_name() {
        let name = ComponentName::new("my-service").unwrap();
        assert_eq!(name.as_str(), "my-service");
    }

    #[test]
    fn empty_returns_error() {
        assert_eq!(ComponentName::new(""), Err(NameError::Empty));
    }

    #[test]
    fn too_long_returns_error() {
        assert_eq!(ComponentName::new(&"a".repeat(64)), Err(NameError::TooLong));
        assert!(ComponentName::new(&"a".repeat(63)).is_ok());
    }

    #[test]
    fn hyphen_at_either_end_returns_error() {
        assert_eq!(ComponentName::new("-db"), Err(NameError::StartsWithHyphen));
        assert_eq!(ComponentName::new("db-"), Err(NameError::EndsWithHyphen));
    }

    #[test]
    fn uppercase_and_punctuation_return_errors() {
        assert_eq!(ComponentName::new("MyApp"), Err(NameError::NotLowercase));
        assert_eq!(ComponentName::new("my_app"), Err(NameError::InvalidChar('_')));
        assert_eq!(ComponentName::new("my.app"), Err(NameError::InvalidChar('.')));
    }

    #[test]
    fn deserializes_with_validation() {
        let name: ComponentName = serde_yaml::from_str("uploads").unwrap();
        assert_eq!(name.as_str(), "uploads");
        assert!(serde_yaml::from_str::<ComponentName>("Uploads").is_err());
    }
}

mod bundle_id_tests {
    use super::*;

    fn name(value: &str) -> ComponentName {
        ComponentName::new(value).unwrap()
    }

    #[test]
    fn formats_name_and_utc_timestamp() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 4, 5, 6).unwrap();
        let id = BundleId::new(name("nightly"), at);
        assert_eq!(id.to_string(), "nightly-20250309T040506Z");
    }

    #[test]
    fn new_truncates_to_whole_seconds() {
        let at = Utc.with_ymd_and_hms(2025, 3, 9, 4, 5, 6).unwrap()
            + chrono::Duration::milliseconds(750);
        let id = BundleId::new(name("nightly"), at);
        assert_eq!(id.created_at().timestamp_subsec_millis(), 0);
        assert_eq!(BundleId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn parses_hyphenated_names() {
        let id = BundleId::parse("pre-update-20250101T000000Z").unwrap();
        assert_eq!(id.name().as_str(), "pre-update");
        assert_eq!(
            id.created_at(),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(matches!(
            BundleId::parse("nightly"),
            Err(ParseBundleIdError::MissingTimestamp(_))
        ));
        assert!(matches!(
            BundleId::parse("nightly20250101T000000Z"),
            Err(ParseBundleIdError::MissingTimestamp(_))
        ));
        assert!(matches!(
            BundleId::parse("nightly-20251301T000000Z"),
            Err(ParseBundleIdError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            BundleId::parse("Nightly-20250101T000000Z"),
            Err(ParseBundleIdError::InvalidName(NameError::NotLowercase))
        ));
    }

    #[test]
    fn orders_by_time_before_name() {
        let older = BundleId::parse("zeta-20250101T000000Z").unwrap();
        let newer = BundleId::parse("alpha-20250102T000000Z").unwrap();
        assert!(newer > older);

        let mut ids = vec![newer.clone(), older.clone()];
        ids.sort();
        assert_eq!(ids, vec![older, newer]);
    }

    #[test]
    fn serializes_as_string() {
        let id = BundleId::parse("nightly-20250101T000000Z").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"nightly-20250101T000000Z\"");
        assert_eq!(serde_json::from_str::<BundleId>(&json).unwrap(), id);
        assert!(serde_json::from_str::<BundleId>("\"nightly\"").is_err());
    }

    proptest! {
        #[test]
        fn display_parses_back(secs in 0i64..4_102_444_800, stem in "[a-z][a-z0-9-]{0,20}[a-z0-9]") {
            let at = Utc.timestamp_opt(secs, 0).unwrap();
            let id = BundleId::new(name(&stem), at);
            prop_assert_eq!(BundleId::parse(&id.to_string()).unwrap(), id);
        }
    }
}

mod id_tests {
    use super::*;

    #[test]
    fn ids_store_value() {
        assert_eq!(ContainerId::new("abc123").as_str(), "abc123");
        assert_eq!(ImageId::new("sha256:abc").into_inner(), "sha256:abc");
        assert_eq!(RunId::new("run-1").to_string(), "run-1");
    }

    #[test]
    fn ids_compare_by_value() {
        assert_eq!(ImageId::new("sha256:abc"), ImageId::new("sha256:abc"));
        assert_ne!(ImageId::new("sha256:abc"), ImageId::new("sha256:def"));
    }

    #[test]
    fn ids_serialize_transparently() {
        let id = ImageId::new("sha256:abc");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"sha256:abc\"");
        assert_eq!(serde_json::from_str::<ImageId>(&json).unwrap(), id);
    }
}
