use expect_test::expect;
use sightline_calc::{compile, evaluate, CalcError};

fn eval(source: &str, inputs: &[f64]) -> f64 {
    evaluate(source, inputs).expect("evaluate")
}

#[test]
fn comparison_yields_boolean_numbers() {
    assert_eq!(eval("A+B>3", &[1.0, 4.0]), 1.0);
    assert_eq!(eval("A+B>3", &[1.0, 1.0]), 0.0);
    assert_eq!(eval("A=2", &[2.0]), 1.0);
    assert_eq!(eval("A#2", &[2.0]), 0.0);
}

#[test]
fn bit_tests_against_status_words() {
    assert_eq!(eval("(A&4)#0", &[6.0]), 1.0);
    assert_eq!(eval("(A&4)#0", &[3.0]), 0.0);
    assert_eq!(eval("A>>2&1", &[4.0]), 1.0);
    assert_eq!(eval("~0", &[]), -1.0);
}

#[test]
fn functions_and_constants() {
    assert_eq!(eval("MAX(A,B,C)", &[1.0, 7.0, 3.0]), 7.0);
    assert_eq!(eval("MIN(A,B)", &[1.0, 7.0]), 1.0);
    assert_eq!(eval("ABS(A)", &[-2.5]), 2.5);
    assert_eq!(eval("NINT(A)", &[2.6]), 3.0);
    assert!((eval("SIN(PI/2)", &[]) - 1.0).abs() < 1e-12);
    assert!((eval("180*D2R", &[]) - std::f64::consts::PI).abs() < 1e-12);
}

#[test]
fn ternary_selects_branch() {
    assert_eq!(eval("A>0?B:C", &[1.0, 10.0, 20.0]), 10.0);
    assert_eq!(eval("A>0?B:C", &[0.0, 10.0, 20.0]), 20.0);
}

#[test]
fn hex_literals_are_integers() {
    assert_eq!(eval("0x10+1", &[]), 17.0);
}

#[test]
fn division_by_zero_is_an_error() {
    let err = evaluate("A/B", &[1.0, 0.0]).expect_err("division by zero");
    assert!(matches!(err, CalcError::Eval(_)));
}

#[test]
fn modulo_of_saturated_value_by_minus_one_is_an_error() {
    let err = evaluate("A%B", &[-1e19, -1.0]).expect_err("overflow");
    assert!(matches!(err, CalcError::Eval(_)));
    assert_eq!(eval("A%B", &[-7.0, -1.0]), 0.0);
    assert_eq!(eval("A%B", &[7.0, 3.0]), 1.0);
}

#[test]
fn missing_input_is_an_error() {
    let program = compile("A+D").expect("compile");
    assert!(program.uses_input(3));
    assert!(!program.uses_input(1));
    assert!(matches!(program.evaluate(&[1.0]), Err(CalcError::Eval(_))));
    assert_eq!(program.evaluate(&[1.0, 0.0, 0.0, 2.0]).expect("eval"), 3.0);
}

#[test]
fn compiled_program_renders_postfix() {
    let program = compile("(A + B) * 2 > MAX(C, 1) && !D").expect("compile");
    expect![[r#"A B + 2 * C 1 MAX/2 > D ! &&"#]].assert_eq(&program.to_string());
    assert_eq!(program.source(), "(A + B) * 2 > MAX(C, 1) && !D");
}

#[test]
fn garbage_fails_to_compile() {
    for text in ["", "A +", "(A", "A B", "FOO(1)", "A @ B"] {
        assert!(
            matches!(compile(text), Err(CalcError::Syntax { .. })),
            "{text:?} should not compile"
        );
    }
}
