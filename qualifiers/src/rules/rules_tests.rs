use super::*;
use crate::hierarchy::enumerated::*;
use crate::hierarchy::index_for::IndexForHierarchy;
use crate::hierarchy::int_range::IntRangeHierarchy;
use crate::hierarchy::same_len::SameLenHierarchy;
use crate::qualifier::IntRange;

fn operand(expr: &Expr, qualifier: Qualifier) -> Operand<'_> {
    Operand { expr, qualifier }
}

fn branches() -> Branches {
    Branches {
        then_store: Store::default(),
        else_store: Store::default(),
    }
}

fn qualifier_in(store: &Store, name: &str) -> Option<Qualifier> {
    store
        .get_value(&Expr::local(name))
        .map(|value| value.qualifier().clone())
}

#[test]
fn odd_arithmetic() {
    let rules = OddRules::new();
    let odd = Qualifier::new(ODD);
    let top = rules.hierarchy().top();
    let (x, y) = (Expr::local("x"), Expr::local("y"));

    assert_eq!(rules.literal(&Literal::Int(3)), odd);
    assert_eq!(rules.literal(&Literal::Int(4)), top);
    assert_eq!(
        rules.unary(UnaryOp::Neg, operand(&x, odd.clone())).unwrap(),
        odd
    );
    assert_eq!(
        rules
            .binary(BinaryOp::Mul, operand(&x, odd.clone()), operand(&y, odd.clone()))
            .unwrap(),
        odd
    );
    let two = Expr::int(2);
    assert_eq!(
        rules
            .binary(BinaryOp::Add, operand(&x, odd.clone()), operand(&two, top.clone()))
            .unwrap(),
        odd
    );
    assert_eq!(
        rules
            .binary(BinaryOp::Add, operand(&x, odd.clone()), operand(&y, odd))
            .unwrap(),
        top
    );
}

#[test]
fn nullness_comparisons() {
    let rules = NullnessRules::new();
    let (x, null) = (Expr::local("x"), Expr::null());
    let nullable = rules.hierarchy().top();

    let mut refined = branches();
    rules
        .compare(
            CompareOp::Ne,
            operand(&x, nullable.clone()),
            operand(&null, rules.null().clone()),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), Some(rules.non_null().clone()));
    assert_eq!(qualifier_in(&refined.else_store, "x"), Some(rules.null().clone()));

    let mut refined = branches();
    rules
        .compare(
            CompareOp::Eq,
            operand(&null, rules.null().clone()),
            operand(&x, nullable),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), Some(rules.null().clone()));
    assert_eq!(qualifier_in(&refined.else_store, "x"), Some(rules.non_null().clone()));

    let mut then_store = Store::default();
    rules.instance_of(&x, &mut then_store).unwrap();
    assert_eq!(qualifier_in(&then_store, "x"), Some(rules.non_null().clone()));
    assert_eq!(rules.dereferenced(), Some(rules.non_null().clone()));
}

#[test]
fn lower_bound_comparisons() {
    let rules = LowerBoundRules::new();
    let unknown = rules.hierarchy().top();
    let non_negative = Qualifier::new(NON_NEGATIVE);
    let positive = Qualifier::new(POSITIVE);
    let (x, y, zero) = (Expr::local("x"), Expr::local("y"), Expr::int(0));

    let mut refined = branches();
    rules
        .compare(
            CompareOp::Ge,
            operand(&x, unknown.clone()),
            operand(&zero, rules.literal(&Literal::Int(0))),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), Some(non_negative.clone()));
    assert!(refined.else_store.is_empty());

    // `y < x` is `x > y`.
    let mut refined = branches();
    rules
        .compare(
            CompareOp::Lt,
            operand(&y, non_negative.clone()),
            operand(&x, unknown.clone()),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), Some(positive.clone()));
    assert_eq!(qualifier_in(&refined.else_store, "y"), None);

    let mut refined = branches();
    rules
        .compare(
            CompareOp::Ne,
            operand(&x, non_negative.clone()),
            operand(&zero, non_negative.clone()),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), Some(positive.clone()));
    assert_eq!(qualifier_in(&refined.else_store, "x"), Some(non_negative.clone()));

    // The else branch of `x <= y` is `x > y`.
    let mut refined = branches();
    rules
        .compare(
            CompareOp::Le,
            operand(&x, unknown.clone()),
            operand(&y, non_negative.clone()),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), None);
    assert_eq!(qualifier_in(&refined.else_store, "x"), Some(positive));

    // The else branch of `x > y` is `y >= x`.
    let mut refined = branches();
    rules
        .compare(
            CompareOp::Gt,
            operand(&x, non_negative.clone()),
            operand(&y, unknown),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "y"), None);
    assert_eq!(qualifier_in(&refined.else_store, "y"), Some(non_negative));
}

#[test]
fn lower_bound_arithmetic() {
    let rules = LowerBoundRules::new();
    let (x, y, one) = (Expr::local("x"), Expr::local("y"), Expr::int(1));
    let non_negative = Qualifier::new(NON_NEGATIVE);
    let positive = Qualifier::new(POSITIVE);

    assert_eq!(rules.literal(&Literal::Int(7)), positive);
    assert_eq!(rules.literal(&Literal::Int(-1)), Qualifier::new(GTE_NEGATIVE_ONE));
    assert_eq!(rules.literal(&Literal::Int(-2)), rules.hierarchy().top());
    assert_eq!(rules.array_length(), non_negative);
    assert_eq!(
        rules
            .binary(BinaryOp::Add, operand(&x, positive.clone()), operand(&y, non_negative.clone()))
            .unwrap(),
        positive
    );
    assert_eq!(
        rules
            .binary(BinaryOp::Sub, operand(&x, non_negative.clone()), operand(&one, positive.clone()))
            .unwrap(),
        Qualifier::new(GTE_NEGATIVE_ONE)
    );
    assert_eq!(
        rules
            .binary(BinaryOp::Sub, operand(&x, positive.clone()), operand(&y, positive))
            .unwrap(),
        rules.hierarchy().top()
    );
}

#[test]
fn int_range_arithmetic() {
    let rules = IntRangeRules::new();
    let ranges = IntRangeHierarchy::new();
    let range = |from, to| ranges.from_range(Some(IntRange::new(from, to)));
    let (x, y) = (Expr::local("x"), Expr::local("y"));

    assert_eq!(rules.literal(&Literal::Int(4)), range(4, 4));
    assert_eq!(rules.array_length(), range(0, i32::MAX as i64));
    assert_eq!(
        rules
            .binary(BinaryOp::Add, operand(&x, range(1, 3)), operand(&y, range(2, 2)))
            .unwrap(),
        range(3, 5)
    );
    assert_eq!(
        rules
            .binary(BinaryOp::Sub, operand(&x, range(1, 3)), operand(&y, range(0, 10)))
            .unwrap(),
        range(-9, 3)
    );
    assert_eq!(
        rules
            .binary(BinaryOp::Mul, operand(&x, range(-2, 3)), operand(&y, range(4, 5)))
            .unwrap(),
        range(-10, 15)
    );
    assert_eq!(
        rules
            .binary(BinaryOp::Add, operand(&x, range(1, i64::MAX - 1)), operand(&y, range(2, 2)))
            .unwrap(),
        rules.hierarchy().top()
    );
    assert_eq!(
        rules.unary(UnaryOp::Neg, operand(&x, range(1, 5))).unwrap(),
        range(-5, -1)
    );
    assert_eq!(
        rules
            .unary(UnaryOp::Neg, operand(&x, rules.hierarchy().bottom()))
            .unwrap(),
        rules.hierarchy().bottom()
    );
}

#[test]
fn int_range_comparisons() {
    let rules = IntRangeRules::new();
    let ranges = IntRangeHierarchy::new();
    let range = |from, to| ranges.from_range(Some(IntRange::new(from, to)));
    let (x, y, ten) = (Expr::local("x"), Expr::local("y"), Expr::int(10));

    let mut refined = branches();
    rules
        .compare(
            CompareOp::Lt,
            operand(&x, rules.hierarchy().top()),
            operand(&ten, range(10, 10)),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), Some(range(i64::MIN, 9)));
    assert_eq!(qualifier_in(&refined.else_store, "x"), Some(range(10, i64::MAX)));

    // `x > y` with overlapping ranges.
    let mut refined = branches();
    rules
        .compare(
            CompareOp::Gt,
            operand(&x, range(0, 5)),
            operand(&y, range(3, 8)),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), Some(range(4, 5)));
    assert_eq!(qualifier_in(&refined.then_store, "y"), Some(range(3, 4)));
    assert_eq!(qualifier_in(&refined.else_store, "x"), Some(range(0, 5)));
    assert_eq!(qualifier_in(&refined.else_store, "y"), Some(range(3, 8)));

    let mut refined = branches();
    rules
        .compare(
            CompareOp::Ne,
            operand(&x, range(0, 10)),
            operand(&ten, range(10, 10)),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), Some(range(0, 9)));
    assert_eq!(qualifier_in(&refined.else_store, "x"), Some(range(10, 10)));
}

#[test]
fn index_for_comparisons() {
    let rules = IndexForRules::new();
    let index_for = IndexForHierarchy::new();
    let top = rules.hierarchy().top();
    let (i, a) = (Expr::local("i"), Expr::local("a"));
    let length = Expr::length(a.clone());

    let mut refined = branches();
    rules
        .compare(
            CompareOp::Lt,
            operand(&i, top.clone()),
            operand(&length, top.clone()),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "i"), Some(index_for.lt_length_of(["a"])));
    assert_eq!(qualifier_in(&refined.else_store, "i"), None);

    let mut refined = branches();
    rules
        .compare(
            CompareOp::Le,
            operand(&length, top.clone()),
            operand(&i, top.clone()),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "i"), None);
    assert_eq!(qualifier_in(&refined.else_store, "i"), Some(index_for.lt_length_of(["a"])));

    let one = Expr::int(1);
    let index = index_for.lt_length_of(["a"]);
    assert_eq!(
        rules
            .binary(BinaryOp::Sub, operand(&i, index.clone()), operand(&one, top.clone()))
            .unwrap(),
        index
    );
    assert_eq!(
        rules
            .binary(BinaryOp::Add, operand(&i, index), operand(&one, top.clone()))
            .unwrap(),
        top
    );

    let mut store = Store::default();
    store.insert_value(&index_for, &i, index_for.lt_length_of(["a", "b"]).into());
    rules
        .invalidate(Invalidation::Assigned(&Expr::local("a")), &mut store)
        .unwrap();
    assert_eq!(qualifier_in(&store, "i"), Some(index_for.lt_length_of(["b"])));
    rules
        .invalidate(Invalidation::Assigned(&Expr::local("b")), &mut store)
        .unwrap();
    assert!(store.is_empty());
}

#[test]
fn same_len_groups() {
    let rules = SameLenRules::new();
    let same_len = SameLenHierarchy::new();
    let (a, b, c) = (Expr::local("a"), Expr::local("b"), Expr::local("c"));
    let mut store = Store::default();

    rules.assigned(&b, &a, &mut store).unwrap();
    assert_eq!(qualifier_in(&store, "a"), Some(same_len.same_len(["b"])));
    assert_eq!(qualifier_in(&store, "b"), Some(same_len.same_len(["a"])));

    rules
        .array_created(&c, &Expr::length(b.clone()), &mut store)
        .unwrap();
    assert_eq!(qualifier_in(&store, "a"), Some(same_len.same_len(["b", "c"])));
    assert_eq!(qualifier_in(&store, "b"), Some(same_len.same_len(["a", "c"])));
    assert_eq!(qualifier_in(&store, "c"), Some(same_len.same_len(["a", "b"])));

    rules
        .invalidate(Invalidation::Assigned(&Expr::local("a")), &mut store)
        .unwrap();
    assert_eq!(qualifier_in(&store, "b"), Some(same_len.same_len(["c"])));
    assert_eq!(qualifier_in(&store, "c"), Some(same_len.same_len(["b"])));

    // Only copies of locals link arrays.
    let mut store = Store::default();
    rules
        .assigned(&a, &Expr::field(Expr::This, "f"), &mut store)
        .unwrap();
    rules.assigned(&a, &a, &mut store).unwrap();
    assert!(store.is_empty());
}

#[test]
fn conversion_refines_through_equality() {
    let rules = ConversionRules::new();
    let int = rules.conversion().category(crate::hierarchy::conversion::INT).unwrap();
    let (x, y) = (Expr::local("x"), Expr::local("y"));

    let mut refined = branches();
    rules
        .compare(
            CompareOp::Eq,
            operand(&x, rules.hierarchy().top()),
            operand(&y, int.clone()),
            &mut refined,
        )
        .unwrap();
    assert_eq!(qualifier_in(&refined.then_store, "x"), Some(int.clone()));
    assert_eq!(qualifier_in(&refined.then_store, "y"), Some(int));
    assert!(refined.else_store.is_empty());
    assert_eq!(rules.literal(&Literal::Int(1)), rules.hierarchy().top());
}

#[test]
fn invalidated_array_names() {
    let (a, i) = (Expr::local("a"), Expr::local("i"));
    let this_a = Expr::field(Expr::This, "a");
    let other_a = Expr::field(Expr::local("o"), "a");
    let element = Expr::access(Expr::local("b"), i.clone());

    let assigned_a = Invalidation::Assigned(&a);
    assert!(assigned_a.affects("a"));
    assert!(assigned_a.affects("a.next"));
    assert!(!assigned_a.affects("this.a"));
    assert!(!assigned_a.affects("ab"));

    // Fields with the same name might be the same location.
    let assigned_field = Invalidation::Assigned(&other_a);
    assert!(assigned_field.affects("this.a"));
    assert!(assigned_field.affects("this.a.b"));
    assert!(assigned_field.affects("get()"));
    assert!(!assigned_field.affects("a"));
    assert!(!assigned_field.affects("this.ab"));

    assert!(Invalidation::Assigned(&i).affects("b[i]"));
    assert!(Invalidation::Assigned(&element).affects("c[j]"));
    assert!(!Invalidation::Assigned(&element).affects("this.c"));
    assert!(Invalidation::Assigned(&Expr::This).affects("this.a"));

    assert!(Invalidation::Heap.affects("this.a"));
    assert!(Invalidation::Heap.affects("b[0]"));
    assert!(!Invalidation::Heap.affects("a"));

    let rules = IndexForRules::new();
    let index_for = IndexForHierarchy::new();
    let mut store = Store::default();
    store.insert_value(&index_for, &i, index_for.lt_length_of(["a", "this.a"]).into());
    rules
        .invalidate(Invalidation::Assigned(&this_a), &mut store)
        .unwrap();
    assert_eq!(qualifier_in(&store, "i"), Some(index_for.lt_length_of(["a"])));
    rules.invalidate(Invalidation::Heap, &mut store).unwrap();
    assert_eq!(qualifier_in(&store, "i"), Some(index_for.lt_length_of(["a"])));
}
