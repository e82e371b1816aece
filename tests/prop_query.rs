use bson::{Bson, Document, doc};
use doclayer::FilterBuilder;
use doclayer::pagination::{MAX_LIMIT, PaginateOptions, PaginateResult};
use doclayer::query::{compare_bson, eval_filter, parse_filter};
use proptest::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Pred {
    Eq(i64),
    Ne(i64),
    Gt(i64),
    Gte(i64),
    Lt(i64),
    Lte(i64),
    Exists(bool),
}

fn pred() -> impl Strategy<Value = Pred> {
    prop_oneof![
        any::<i64>().prop_map(Pred::Eq),
        any::<i64>().prop_map(Pred::Ne),
        any::<i64>().prop_map(Pred::Gt),
        any::<i64>().prop_map(Pred::Gte),
        any::<i64>().prop_map(Pred::Lt),
        any::<i64>().prop_map(Pred::Lte),
        any::<bool>().prop_map(Pred::Exists),
    ]
}

fn apply(fb: &mut FilterBuilder, key: &str, p: &Pred) {
    match *p {
        Pred::Eq(v) => fb.eq(key, v),
        Pred::Ne(v) => fb.ne(key, v),
        Pred::Gt(v) => fb.gt(key, v),
        Pred::Gte(v) => fb.gte(key, v),
        Pred::Lt(v) => fb.lt(key, v),
        Pred::Lte(v) => fb.lte(key, v),
        Pred::Exists(v) => fb.exists(key, v),
    };
}

fn eval(doc: &Document, filter: &Document) -> bool {
    eval_filter(doc, &parse_filter(filter).unwrap())
}

proptest! {
    #[test]
    fn one_key_per_distinct_field(calls in proptest::collection::vec(("[a-e]", pred()), 0..40)) {
        let mut fb = FilterBuilder::new();
        for (key, p) in &calls {
            apply(&mut fb, key, p);
        }
        let built = fb.build();
        let distinct: HashSet<&str> = calls.iter().map(|(k, _)| k.as_str()).collect();
        prop_assert_eq!(built.len(), distinct.len());

        // last predicate per field wins
        for key in distinct {
            let Some((_, last)) = calls.iter().rev().find(|(k, _)| k == key) else { continue };
            let mut single = FilterBuilder::new();
            apply(&mut single, key, last);
            let expected = single.build();
            prop_assert_eq!(built.get(key), expected.get(key));
        }
    }

    #[test]
    fn gt_and_lte_are_complementary(value in any::<i64>(), pivot in any::<i64>()) {
        let d = doc! { "v": value };
        let gt = FilterBuilder::new().gt("v", pivot).build();
        let lte = FilterBuilder::new().lte("v", pivot).build();
        prop_assert!(eval(&d, &gt) != eval(&d, &lte));
    }

    #[test]
    fn integer_order_is_exact_beyond_double_precision(offset in 0_i64..1_000_000, delta in 1_i64..4) {
        let pivot = (1_i64 << 53) + offset;
        let d = doc! { "v": pivot + delta };
        prop_assert!(eval(&d, &FilterBuilder::new().gt("v", pivot).build()));
        prop_assert!(!eval(&d, &FilterBuilder::new().lte("v", pivot).build()));
        prop_assert!(!eval(&d, &FilterBuilder::new().eq("v", pivot).build()));
    }

    #[test]
    fn numeric_comparison_ignores_width(a in any::<i32>(), b in any::<i32>()) {
        let by_i32 = compare_bson(&Bson::Int32(a), &Bson::Int32(b));
        prop_assert_eq!(compare_bson(&Bson::Int64(i64::from(a)), &Bson::Double(f64::from(b))), by_i32);
        prop_assert_eq!(compare_bson(&Bson::Int32(a), &Bson::Int32(a)), Ordering::Equal);
    }

    #[test]
    fn pagination_normalizes_into_bounds(page in any::<i64>(), limit in any::<i64>()) {
        let n = PaginateOptions::new(page, limit).normalized();
        prop_assert!(n.page >= 1);
        prop_assert!((1..=MAX_LIMIT).contains(&n.limit));
        if limit <= 0 { prop_assert_eq!(n.limit, 10); }
        if limit > MAX_LIMIT { prop_assert_eq!(n.limit, MAX_LIMIT); }
        if page <= 0 { prop_assert_eq!(n.page, 1); }
    }

    #[test]
    fn probe_trims_to_limit(len in 0usize..40, limit in 1i64..20) {
        let opts = PaginateOptions::new(1, limit);
        let r = PaginateResult::from_probe((0..len).collect::<Vec<_>>(), len as u64, opts);
        let lim = usize::try_from(limit).unwrap();
        prop_assert_eq!(r.data.len(), len.min(lim));
        prop_assert_eq!(r.next_page, if len > lim { 2 } else { 0 });
    }
}
