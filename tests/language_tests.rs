//! Integration tests for the supported language subset

mod common;
use common::run_js;
use spreadcall::Value;

mod declarations {
    use super::*;

    #[test]
    fn test_var_let_const_are_function_scoped() {
        let result = run_js(
            r#"
            function f() {
                if (true) { var a = 1; let b = 2; const c = 3; }
                return a + b + c;
            }
            f();
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::Number(6.0));
    }

    #[test]
    fn test_hoisting() {
        let result = run_js(
            r#"
            var before = typeof later + ':' + typeof hoisted + ':' + x;
            var x = 5;
            function hoisted() { return 1; }
            var later = function() {};
            before;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("undefined:function:undefined"));
    }

    #[test]
    fn test_nested_function_declarations_hoist() {
        let result = run_js(
            r#"
            function outer() {
                var r = inner();
                if (false) { function never() {} }
                function inner() { return typeof never; }
                return r;
            }
            outer();
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("function"));
    }

    #[test]
    fn test_closures_capture_scope() {
        let result = run_js(
            r#"
            function counter() {
                var n = 0;
                return function() { n += 1; return n; };
            }
            var c1 = counter();
            var c2 = counter();
            c1(); c1();
            c1() * 10 + c2();
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::Number(31.0));
    }

    #[test]
    fn test_rest_parameters() {
        let result = run_js(
            r#"
            function f(first, ...rest) { return first + ':' + rest.length + ':' + rest[1]; }
            f(1, 2, 3);
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("1:2:3"));
    }

    #[test]
    fn test_implicit_global_assignment() {
        let result = run_js("function f() { leaked = 9; } f(); globalThis.leaked;").unwrap();
        assert_eq!(result, Value::Number(9.0));
    }
}

mod control_flow {
    use super::*;

    #[test]
    fn test_for_with_break_and_continue() {
        let result = run_js(
            r#"
            var sum = 0;
            for (var i = 0; i < 100; i++) {
                if (i % 2 === 0) continue;
                if (i > 9) break;
                sum += i;
            }
            sum;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::Number(25.0));
    }

    #[test]
    fn test_while_and_do_while() {
        let result = run_js(
            r#"
            var n = 0, m = 0;
            while (n < 5) { n++; }
            do { m++; } while (m < 0);
            n * 10 + m;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::Number(51.0));
    }

    #[test]
    fn test_continue_in_do_while_checks_condition() {
        let result = run_js(
            r#"
            var i = 0, hits = 0;
            do { i++; if (i < 3) continue; hits++; } while (i < 5);
            hits;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::Number(3.0));
    }

    #[test]
    fn test_with_statement() {
        let result = run_js(
            r#"
            var o = { a: 1 };
            var a = 'outer';
            with (o) { a = 2; var b = a; }
            o.a + ':' + a + ':' + b;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("2:outer:2"));
    }

    #[test]
    fn test_empty_with_body() {
        let result = run_js("with ({}); 'done';").unwrap();
        assert_eq!(result, Value::string("done"));
    }

    #[test]
    fn test_if_else_chain() {
        let result = run_js(
            r#"
            function grade(n) { if (n > 89) return 'A'; else if (n > 79) return 'B'; else return 'C'; }
            grade(95) + grade(85) + grade(10);
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("ABC"));
    }
}

mod expressions {
    use super::*;

    #[test]
    fn test_operators() {
        assert_eq!(run_js("1 + 2 * 3 - 4 / 2;").unwrap(), Value::Number(5.0));
        assert_eq!(run_js("'10' == 10 && '10' !== 10;").unwrap(), Value::Boolean(true));
        assert_eq!(run_js("null == undefined;").unwrap(), Value::Boolean(true));
        assert_eq!(run_js("'b' > 'a' && 2 >= 2 && 1 <= 0 === false;").unwrap(), Value::Boolean(true));
        assert_eq!(run_js("0 || 'x';").unwrap(), Value::string("x"));
        assert_eq!(run_js("1 && 0;").unwrap(), Value::Number(0.0));
        assert_eq!(run_js("(1, 2, 3);").unwrap(), Value::Number(3.0));
        assert_eq!(run_js("void 5;").unwrap(), Value::Undefined);
        assert_eq!(run_js("-'3' + +'4';").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn test_number_text_conversions() {
        assert_eq!(run_js("'' + 0.000001;").unwrap(), Value::string("0.000001"));
        assert_eq!(run_js("'' + 1e-7;").unwrap(), Value::string("1e-7"));
        assert_eq!(
            run_js("0x10000000000000000;").unwrap(),
            Value::Number(18446744073709551616.0)
        );
        assert_eq!(
            run_js("+'0x10000000000000000' === 0x10000000000000000;").unwrap(),
            Value::Boolean(true)
        );
    }

    #[test]
    fn test_update_expressions() {
        let result = run_js(
            r#"
            var i = 5;
            var o = { n: 1 };
            var a = i++;
            var b = ++i;
            var c = o.n--;
            var d = --o['n'];
            a + ',' + b + ',' + c + ',' + d + ',' + i + ',' + o.n;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("5,7,1,-1,7,-1"));
    }

    #[test]
    fn test_compound_assignment() {
        let result = run_js(
            r#"
            var x = 10;
            var o = { v: 2 };
            x -= 4; x *= 3; x /= 2;
            o.v += 5; o['v'] *= 2;
            x + o.v;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::Number(23.0));
    }

    #[test]
    fn test_typeof_and_delete() {
        let result = run_js(
            r#"
            var o = { a: 1, b: 2 };
            var removed = delete o.a;
            typeof missing + ':' + typeof o + ':' + typeof print + ':' + removed + ':' + Object.keys(o).length;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("undefined:object:function:true:1"));
    }

    #[test]
    fn test_object_literal_keys() {
        let result = run_js(
            r#"
            var k = 'dyn';
            var o = { plain: 1, 'quoted key': 2, 3: 3, [k + 'amic']: 4 };
            o.plain + o['quoted key'] + o[3] + o.dynamic;
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::Number(10.0));
    }

    #[test]
    fn test_array_holes_and_length() {
        let result = run_js("var a = [1, , 3]; var b = [, ,]; a.length + ':' + b.length + ':' + typeof a[1];")
            .unwrap();
        assert_eq!(result, Value::string("3:2:undefined"));
    }

    #[test]
    fn test_this_binding() {
        let result = run_js(
            r#"
            var o = { v: 4, get: function() { return this.v; } };
            function loose() { return this === globalThis; }
            o.get() + ':' + o['get']() + ':' + loose();
            "#,
        )
        .unwrap();
        assert_eq!(result, Value::string("4:4:true"));
    }

    #[test]
    fn test_anonymous_function_names() {
        let result = run_js(
            r#"
            var f = function() {};
            var o = { m: function() {} };
            var g;
            g = function() {};
            '' + f + '|' + o.m + '|' + g;
            "#,
        )
        .unwrap();
        assert_eq!(
            result,
            Value::string("function f() { [code] }|function m() { [code] }|function g() { [code] }")
        );
    }

    #[test]
    fn test_string_indexing() {
        let result = run_js("var s = 'héllo'; s.length + s[1];").unwrap();
        assert_eq!(result, Value::string("5é"));
    }

    #[test]
    fn test_automatic_semicolons() {
        let result = run_js("var a = 1\nvar b = 2\na + b").unwrap();
        assert_eq!(result, Value::Number(3.0));
    }
}
