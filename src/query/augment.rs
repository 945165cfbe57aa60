//! Predicate augmenters: pure rewrites of a [`RawQuery`] that turn
//! recognized boundary keys into store-ready predicates.
//!
//! Augmenters never fail. Malformed optional input (an unparseable date, an
//! empty owner id) degrades to "no filter" instead of failing the request;
//! the recognized key is consumed either way so it cannot fall through to
//! the free-form filter stage.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::query::raw::{FilterPredicate, RawQuery};

/// Boundary key rewritten into an owner-equality predicate.
pub const OWNER_KEY: &str = "owner";
/// Boundary keys rewritten into a creation-timestamp range predicate.
pub const START_DATE_KEY: &str = "startDate";
pub const END_DATE_KEY: &str = "endDate";

/// Column the date-range augmenter constrains.
pub const CREATED_AT_FIELD: &str = "created_at";

/// When the query carries an owner id, move it out of the free-form filter
/// set and install it as an equality predicate on the owner field.
///
/// The id is treated as an opaque string; format errors are the store's to
/// surface (as an empty match), not the augmenter's.
pub fn scope_to_owner(mut query: RawQuery) -> RawQuery {
    let Some(owner) = query.remove(OWNER_KEY) else {
        return query;
    };
    if !owner.is_empty() {
        query.push_predicate(FilterPredicate::eq(OWNER_KEY, owner));
    }
    query
}

/// When the query carries `startDate` and/or `endDate`, install a single
/// inclusive range predicate on the creation timestamp:
/// `>= start-of-day(start)`, `<= end-of-day(end)`, or both.
///
/// Days are interpreted in UTC; the end bound reaches the last millisecond
/// of the day. Values that do not parse as dates behave exactly as if the
/// key were absent.
pub fn scope_to_created_range(mut query: RawQuery) -> RawQuery {
    let start = query
        .remove(START_DATE_KEY)
        .as_deref()
        .and_then(parse_day)
        .map(day_start_millis);
    let end = query
        .remove(END_DATE_KEY)
        .as_deref()
        .and_then(parse_day)
        .map(day_end_millis);

    let predicate = match (start, end) {
        (Some(lo), Some(hi)) => Some(FilterPredicate::between(CREATED_AT_FIELD, lo, hi)),
        (Some(lo), None) => Some(FilterPredicate::gte(CREATED_AT_FIELD, lo)),
        (None, Some(hi)) => Some(FilterPredicate::lte(CREATED_AT_FIELD, hi)),
        (None, None) => None,
    };
    if let Some(predicate) = predicate {
        query.push_predicate(predicate);
    }
    query
}

/// Accepts `YYYY-MM-DD`, or an RFC 3339 timestamp whose UTC date part is used.
fn parse_day(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok().or_else(|| {
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).date_naive())
    })
}

fn day_start_millis(day: NaiveDate) -> i64 {
    day.and_time(NaiveTime::MIN).and_utc().timestamp_millis()
}

fn day_end_millis(day: NaiveDate) -> i64 {
    day.succ_opt()
        .map_or(i64::MAX, |next| day_start_millis(next) - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn owner_key_becomes_equality_predicate() {
        let query = RawQuery::from_pairs([("owner", "u1"), ("title", "Lamp")]);
        let scoped = scope_to_owner(query);
        assert!(!scoped.contains_key(OWNER_KEY));
        assert_eq!(scoped.predicates(), &[FilterPredicate::eq("owner", "u1")]);
        assert_eq!(scoped.get("title"), Some("Lamp"));
    }

    #[test]
    fn empty_owner_is_consumed_without_predicate() {
        let scoped = scope_to_owner(RawQuery::from_pairs([("owner", "")]));
        assert_eq!(scoped, RawQuery::new());
    }

    #[test]
    fn both_dates_collapse_into_one_inclusive_range() {
        let query = RawQuery::from_pairs([("startDate", "2024-01-01"), ("endDate", "2024-01-31")]);
        let scoped = scope_to_created_range(query);
        assert_eq!(
            scoped.predicates(),
            &[FilterPredicate::between(
                CREATED_AT_FIELD,
                1_704_067_200_000_i64,
                1_706_745_599_999_i64,
            )]
        );
    }

    #[test]
    fn start_only_uses_start_of_day() {
        let scoped = scope_to_created_range(RawQuery::from_pairs([("startDate", "2024-01-01")]));
        assert_eq!(
            scoped.predicates(),
            &[FilterPredicate::gte(CREATED_AT_FIELD, 1_704_067_200_000_i64)]
        );
    }

    #[test]
    fn end_only_uses_last_millisecond_of_day() {
        let scoped = scope_to_created_range(RawQuery::from_pairs([("endDate", "2024-01-31")]));
        assert_eq!(
            scoped.predicates(),
            &[FilterPredicate::lte(CREATED_AT_FIELD, 1_706_745_599_999_i64)]
        );
    }

    #[test]
    fn rfc3339_timestamp_contributes_its_date_part() {
        let scoped =
            scope_to_created_range(RawQuery::from_pairs([("startDate", "2024-01-01T15:30:00Z")]));
        assert_eq!(
            scoped.predicates(),
            &[FilterPredicate::gte(CREATED_AT_FIELD, 1_704_067_200_000_i64)]
        );
    }

    proptest! {
        /// Without the owner key, the ownership augmenter is the identity.
        #[test]
        fn owner_augmenter_is_identity_without_key(
            pairs in proptest::collection::vec(("[a-zA-Z0-9_]{1,12}", ".{0,24}"), 0..6)
        ) {
            let mut query = RawQuery::from_pairs(pairs);
            query.remove(OWNER_KEY);
            let before = query.clone();
            prop_assert_eq!(scope_to_owner(query), before);
        }

        /// An unparseable startDate behaves exactly like an absent one.
        #[test]
        fn garbage_start_date_equals_absent(
            garbage in "[a-zA-Z !@#]{1,16}",
            end in prop_oneof![Just(None), Just(Some("2024-06-30"))],
        ) {
            prop_assume!(parse_day(&garbage).is_none());

            let mut with_garbage = RawQuery::from_pairs([("startDate", garbage.as_str())]);
            let mut without = RawQuery::new();
            if let Some(end) = end {
                with_garbage.insert(END_DATE_KEY, end);
                without.insert(END_DATE_KEY, end);
            }
            prop_assert_eq!(
                scope_to_created_range(with_garbage),
                scope_to_created_range(without)
            );
        }

        /// The two augmenters inspect disjoint keys, so application order
        /// yields the same conjunctive predicate set.
        #[test]
        fn augmenters_commute(
            owner in ".{0,12}",
            start in prop_oneof![Just("2024-01-01".to_string()), "[a-z]{1,8}"],
        ) {
            let query = RawQuery::from_pairs([("owner", owner), ("startDate", start)]);
            let a = scope_to_created_range(scope_to_owner(query.clone()));
            let b = scope_to_owner(scope_to_created_range(query));

            let mut preds_a: Vec<String> = a.predicates().iter().map(|p| format!("{p:?}")).collect();
            let mut preds_b: Vec<String> = b.predicates().iter().map(|p| format!("{p:?}")).collect();
            preds_a.sort();
            preds_b.sort();
            prop_assert_eq!(preds_a, preds_b);
            prop_assert!(!a.contains_key(OWNER_KEY) && !a.contains_key(START_DATE_KEY));
            prop_assert!(!b.contains_key(OWNER_KEY) && !b.contains_key(START_DATE_KEY));
        }
    }
}
