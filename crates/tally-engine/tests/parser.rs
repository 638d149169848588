use pretty_assertions::assert_eq;
use tally_engine::{parse, BinaryOp, Expr, TallyError, UnaryOp};

fn leaf(name: &str) -> Expr {
    Expr::Leaf {
        name: name.to_string(),
        index: None,
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}

#[test]
fn multiplication_binds_tighter_than_addition() {
    assert_eq!(
        parse("a + b * 2").unwrap(),
        binary(
            BinaryOp::Add,
            leaf("a"),
            binary(BinaryOp::Multiply, leaf("b"), Expr::Number(2.0)),
        )
    );
}

#[test]
fn logic_binds_looser_than_comparison() {
    assert_eq!(
        parse("x > 1 && y <= 2 || !z").unwrap(),
        binary(
            BinaryOp::Or,
            binary(
                BinaryOp::And,
                binary(BinaryOp::Greater, leaf("x"), Expr::Number(1.0)),
                binary(BinaryOp::LessEquals, leaf("y"), Expr::Number(2.0)),
            ),
            Expr::UnaryOp {
                op: UnaryOp::Not,
                expr: Box::new(leaf("z")),
            },
        )
    );
}

#[test]
fn single_equals_is_equality() {
    assert_eq!(parse("n = 2").unwrap(), parse("n == 2").unwrap());
}

#[test]
fn subtraction_is_left_associative() {
    assert_eq!(
        parse("a - b - c").unwrap(),
        binary(
            BinaryOp::Subtract,
            binary(BinaryOp::Subtract, leaf("a"), leaf("b")),
            leaf("c"),
        )
    );
}

#[test]
fn indexed_leaves_and_calls() {
    assert_eq!(
        parse("max(jet.pt[1], 1e2)").unwrap(),
        Expr::Call {
            name: "max".into(),
            args: vec![
                Expr::Leaf {
                    name: "jet.pt".into(),
                    index: Some(1),
                },
                Expr::Number(100.0),
            ],
        }
    );
}

#[test]
fn leaf_names_in_first_use_order() {
    let expr = parse("b * a + sum(b) - c[0]").unwrap();
    assert_eq!(expr.leaf_names(), vec!["b", "a", "c"]);
}

#[test]
fn rejects_malformed_input() {
    assert!(matches!(parse(""), Err(TallyError::EmptyExpression)));
    assert!(matches!(parse("   "), Err(TallyError::EmptyExpression)));
    assert!(matches!(parse("a & b"), Err(TallyError::Parse(_))));
    assert!(matches!(parse("a +"), Err(TallyError::Parse(_))));
    assert!(matches!(parse("(a"), Err(TallyError::Parse(_))));
    assert!(matches!(parse("pt[1.5]"), Err(TallyError::Parse(_))));
    assert!(matches!(parse("a b"), Err(TallyError::Parse(_))));
    assert!(matches!(parse("1e"), Err(TallyError::Parse(_))));
    assert!(matches!(parse("x $ y"), Err(TallyError::Parse(_))));
}
