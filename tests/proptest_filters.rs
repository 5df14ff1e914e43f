//! Property-based tests using proptest
//!
//! These tests verify the age filter boundary, the backoff schedule, the
//! page parser and email handling using randomized inputs.

use atlas_sweep::api::http::RetryPolicy;
use atlas_sweep::api::pagination::{parse_page, Cursor};
use atlas_sweep::resource::filter::older_than;
use atlas_sweep::resource::model::Project;
use atlas_sweep::workflow::{is_valid_email, plan_invitations};
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use std::collections::HashSet;

fn project_created(created: Option<DateTime<Utc>>) -> Project {
    Project {
        id: "p".into(),
        name: "p".into(),
        org_id: "o".into(),
        created,
    }
}

fn arb_now() -> impl Strategy<Value = DateTime<Utc>> {
    // 2020-01-01 .. 2030-01-01
    (1_577_836_800i64..1_893_456_000i64).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

fn arb_policy() -> impl Strategy<Value = RetryPolicy> {
    (1u32..10, 1u64..2_000, 1u64..60_000).prop_map(|(max_attempts, base, max)| RetryPolicy {
        max_attempts,
        base_delay_ms: base,
        max_delay_ms: max,
        max_total_wait_ms: 120_000,
    })
}

proptest! {
    /// Exactly at the threshold is never selected; a day past it always is
    #[test]
    fn age_boundary_is_strict(now in arb_now(), days in 0u32..3650) {
        let exact = project_created(Some(now - Duration::days(i64::from(days))));
        let past = project_created(Some(now - Duration::days(i64::from(days) + 1)));

        prop_assert!(!older_than(&exact, days, now));
        prop_assert!(older_than(&past, days, now));
    }

    /// Selection agrees with a direct age comparison
    #[test]
    fn age_filter_matches_elapsed_seconds(now in arb_now(), age_secs in 0i64..400_000_000, days in 0u32..3650) {
        let p = project_created(Some(now - Duration::seconds(age_secs)));
        let expected = age_secs > i64::from(days) * 86_400;
        prop_assert_eq!(older_than(&p, days, now), expected);
    }

    /// Undated resources are never selected
    #[test]
    fn undated_never_selected(now in arb_now(), days in 0u32..3650) {
        prop_assert!(!older_than(&project_created(None), days, now));
    }

    /// Backoff never exceeds the per-delay cap and never shrinks between retries
    #[test]
    fn backoff_is_capped_and_monotonic(policy in arb_policy(), retry in 1u32..30) {
        let this = policy.backoff(retry, 0.0);
        let next = policy.backoff(retry + 1, 0.0);
        prop_assert!(this.as_millis() as u64 <= policy.max_delay_ms);
        prop_assert!(next >= this);
    }

    /// Jitter only ever adds delay, within the cap
    #[test]
    fn jitter_adds_bounded_delay(policy in arb_policy(), retry in 1u32..30, jitter in 0.0f64..1.0) {
        let base = policy.backoff(retry, 0.0);
        let jittered = policy.backoff(retry, jitter);
        prop_assert!(jittered >= base);
        prop_assert!(jittered.as_millis() as u64 <= policy.max_delay_ms);
    }

    /// The page parser never drops records
    #[test]
    fn parse_page_keeps_every_record(n in 0usize..600, next in any::<bool>(), page in 1u32..50) {
        let records: Vec<_> = (0..n).map(|i| json!({"id": i.to_string()})).collect();
        let mut links = vec![json!({"rel": "self"})];
        if next {
            links.push(json!({"rel": "next"}));
        }
        let body = json!({"results": records, "links": links});

        let (items, cursor) = parse_page(&body, &Cursor::Number(page));
        prop_assert_eq!(items.len(), n);
        prop_assert_eq!(cursor, if next { Some(Cursor::Number(page + 1)) } else { None });
    }

    /// Well-formed addresses are accepted
    #[test]
    fn generated_emails_are_valid(email in "[a-z0-9._%+-]{1,20}@[a-z0-9-]{1,20}\\.[a-z]{2,6}") {
        prop_assert!(is_valid_email(&email));
    }

    /// Anything without an @ is rejected
    #[test]
    fn emails_without_at_are_invalid(s in "[a-zA-Z0-9._%+-]{0,40}") {
        prop_assert!(!is_valid_email(&s));
    }

    /// Planning invitations partitions the input without loss
    #[test]
    fn invitations_partition_emails(emails in prop::collection::vec("[a-z@.]{0,12}", 0..30)) {
        let (targets, invalid) = plan_invitations("org", &emails, &[]);
        prop_assert_eq!(targets.len() + invalid.len(), emails.len());

        let invalid: HashSet<&String> = invalid.iter().collect();
        for email in &emails {
            prop_assert_eq!(invalid.contains(email), !is_valid_email(email));
        }
    }
}
