use dataflow::domains::JoinSemiLattice;

use crate::hierarchy::QualifierHierarchy;
use crate::hierarchy::enumerated::{self, *};
use crate::hierarchy::int_range::IntRangeHierarchy;
use crate::ir::Expr;
use crate::qualifier::{IntRange, Qualifier};
use crate::store::Store;
use crate::value::AbstractValue;

fn value(name: &str) -> AbstractValue {
    Qualifier::new(name).into()
}

fn x() -> Expr {
    Expr::local("x")
}

#[test]
fn merge_keeps_common_keys() {
    let hierarchy = enumerated::lower_bound();
    let mut left = Store::default();
    left.insert_value(&hierarchy, &x(), value(POSITIVE));
    left.insert_value(&hierarchy, &Expr::local("y"), value(POSITIVE));
    let mut right = Store::default();
    right.insert_value(&hierarchy, &x(), value(NON_NEGATIVE));

    let merged = left.join(&right, &hierarchy).unwrap();
    assert_eq!(merged.to_string(), "{x: NonNegative}");
    assert_eq!(merged, right.join(&left, &hierarchy).unwrap());
    assert!(left.is_leq(&merged, &hierarchy).unwrap());
    assert!(right.is_leq(&merged, &hierarchy).unwrap());
    assert!(!merged.is_leq(&left, &hierarchy).unwrap());

    // Values that reach top are dropped.
    let mut unknown = Store::default();
    unknown.insert_value(&hierarchy, &x(), value(GTE_NEGATIVE_ONE));
    let mut negative = Store::default();
    negative.insert_value(&hierarchy, &x(), value(LOWER_BOUND_BOTTOM));
    assert_eq!(unknown.join(&negative, &hierarchy).unwrap(), unknown);
    let mut nullness = Store::default();
    let null_hierarchy = enumerated::nullness();
    nullness.insert_value(&null_hierarchy, &x(), value(NON_NULL));
    let mut null = Store::default();
    null.insert_value(&null_hierarchy, &x(), value(NULL));
    assert!(nullness.join(&null, &null_hierarchy).unwrap().is_empty());
}

#[test]
fn top_is_never_stored() {
    let hierarchy = enumerated::nullness();
    let mut store = Store::default();
    store.insert_value(&hierarchy, &x(), value(NON_NULL));
    assert_eq!(store.len(), 1);
    store.insert_value(&hierarchy, &x(), hierarchy.top().into());
    assert!(store.is_empty());
    assert_eq!(store.get_value(&x()), None);
}

#[test]
fn refine_uses_greatest_lower_bound() {
    let hierarchy = enumerated::lower_bound();
    let mut store = Store::default();
    store
        .insert_or_refine(&hierarchy, &x(), value(NON_NEGATIVE))
        .unwrap();
    store
        .insert_or_refine(&hierarchy, &x(), value(GTE_NEGATIVE_ONE))
        .unwrap();
    assert_eq!(store.get_value(&x()), Some(&value(NON_NEGATIVE)));
    store.insert_or_refine(&hierarchy, &x(), value(POSITIVE)).unwrap();
    assert_eq!(store.get_value(&x()), Some(&value(POSITIVE)));

    let foreign = store.insert_or_refine(&hierarchy, &x(), value(NON_NULL));
    assert!(foreign.is_err());
}

#[test]
fn keys_are_canonical() {
    let hierarchy = enumerated::nullness();
    let mut store = Store::default();
    let this_field = Expr::field(Expr::local("this"), "f");
    store.insert_value(&hierarchy, &Expr::Paren(Box::new(this_field)), value(NON_NULL));
    assert_eq!(
        store.get_value(&Expr::field(Expr::This, "f")),
        Some(&value(NON_NULL))
    );
    assert_eq!(store.to_string(), "{this.f: NonNull}");

    // Literals and unknown expressions are not tracked.
    store.insert_value(&hierarchy, &Expr::null(), value(NULL));
    store.insert_value(&hierarchy, &Expr::Unknown("a + b".to_owned()), value(NULL));
    assert_eq!(store.len(), 1);
}

#[test]
fn kill_removes_dependent_facts() {
    let hierarchy = enumerated::nullness();
    let (a, i) = (Expr::local("a"), Expr::local("i"));
    let mut store = Store::default();
    for expr in [
        x(),
        Expr::field(x(), "f"),
        Expr::access(a.clone(), i.clone()),
        Expr::call(Some(a.clone()), "get", vec![x()]),
        Expr::length(a.clone()),
    ] {
        store.insert_value(&hierarchy, &expr, value(NON_NULL));
    }
    store.kill_value(&x());
    assert_eq!(store.to_string(), "{a.length: NonNull, a[i]: NonNull}");

    store.clear_value(&Expr::length(a));
    assert_eq!(store.to_string(), "{a[i]: NonNull}");
}

#[test]
fn assignment_invalidates_aliases() {
    let hierarchy = enumerated::nullness();
    let (a, y) = (Expr::local("a"), Expr::local("y"));
    let fill = |store: &mut Store| {
        for expr in [
            Expr::field(x(), "f"),
            Expr::field(x(), "g"),
            Expr::access(a.clone(), Expr::int(0)),
            Expr::length(a.clone()),
            Expr::call(None, "get", vec![]),
            y.clone(),
        ] {
            store.insert_value(&hierarchy, &expr, value(NON_NULL));
        }
    };

    let mut store = Store::default();
    fill(&mut store);
    store.update_for_assignment(&hierarchy, &Expr::field(y.clone(), "f"), Some(value(NULL)));
    assert_eq!(
        store.to_string(),
        "{y: NonNull, x.g: NonNull, y.f: Null, a.length: NonNull, a[0]: NonNull}"
    );

    let mut store = Store::default();
    fill(&mut store);
    store.update_for_assignment(&hierarchy, &Expr::access(y.clone(), Expr::local("i")), None);
    assert_eq!(
        store.to_string(),
        "{y: NonNull, x.f: NonNull, x.g: NonNull, a.length: NonNull}"
    );

    let mut store = Store::default();
    fill(&mut store);
    store.update_for_assignment(&hierarchy, &y, Some(value(NULL)));
    assert_eq!(store.get_value(&y), Some(&value(NULL)));
    assert_eq!(store.len(), 6);
}

#[test]
fn calls_havoc_the_heap() {
    let hierarchy = enumerated::nullness();
    let a = Expr::local("a");
    let call = Expr::call(Some(x()), "size", vec![]);
    let mut store = Store::default();
    for expr in [
        x(),
        Expr::field(x(), "f"),
        Expr::access(a.clone(), Expr::int(0)),
        Expr::length(a.clone()),
        Expr::call(None, "other", vec![]),
    ] {
        store.insert_value(&hierarchy, &expr, value(NON_NULL));
    }

    let mut pure = store.clone();
    pure.update_for_method_call(&hierarchy, &call, true, true, Some(value(NON_NULL)));
    assert_eq!(pure.len(), 6);
    assert_eq!(pure.get_value(&call), Some(&value(NON_NULL)));

    store.update_for_method_call(&hierarchy, &call, false, false, Some(value(NON_NULL)));
    assert_eq!(store.to_string(), "{x: NonNull, a.length: NonNull}");
}

#[test]
fn concurrent_semantics_forgets_fields() {
    let hierarchy = enumerated::nullness();
    let mut store = Store::new(false);
    store.insert_value(&hierarchy, &Expr::field(x(), "f"), value(NON_NULL));
    store.insert_value(&hierarchy, &Expr::length(x()), value(NON_NULL));
    store.insert_value(&hierarchy, &x(), value(NON_NULL));
    assert_eq!(store.to_string(), "{x: NonNull, x.length: NonNull}");
    assert!(!store.sequential_semantics());
}

#[test]
fn widening_merges_ranges() {
    let hierarchy = IntRangeHierarchy::new();
    let range = |from, to| AbstractValue::from(hierarchy.from_range(Some(IntRange::new(from, to))));
    let mut previous = Store::default();
    previous.insert_value(&hierarchy, &x(), range(0, 5));
    let mut new = Store::default();
    new.insert_value(&hierarchy, &x(), range(0, 6));

    let widened = new.widen(&previous, &hierarchy, 11).unwrap();
    assert_eq!(widened.get_value(&x()), Some(&range(0, i8::MAX as i64)));
    let joined = new.join(&previous, &hierarchy).unwrap();
    assert_eq!(joined.get_value(&x()), Some(&range(0, 6)));
}
