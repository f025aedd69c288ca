use std::sync::Arc;

use compiler::{CompileError, CompiledTemplate, Compiler, CompilerSettings, FormalArgument};
use parser::{Category, ErrorBuffer, ErrorKind};

fn setup() -> (Compiler, Arc<ErrorBuffer>) {
    let errors = Arc::new(ErrorBuffer::new());
    let compiler = Compiler::with_listener(CompilerSettings::default(), errors.clone());
    (compiler, errors)
}

fn strings(t: &CompiledTemplate) -> String {
    format!("[{}]", t.strings.join(", "))
}

#[track_caller]
fn check(template: &str, asm: &str, pool: &str) {
    let (compiler, errors) = setup();
    let t = compiler.compile(template).unwrap();
    assert!(errors.is_empty(), "{template}: {errors}");
    assert_eq!(t.instrs(), asm, "{template}");
    assert_eq!(strings(&t), pool, "{template}");
}

// ═══════════════════════════════════════════════════════════════════
// Instruction selection
// ═══════════════════════════════════════════════════════════════════

#[test]
fn attributes_and_text() {
    check("hi <name>", "write_str 0, load_attr 1, write", "[hi , name]");
    check("a\nb", "write_str 0, newline, write_str 1", "[a, b]");
    check("hi <a.b>", "write_str 0, load_attr 1, load_prop 2, write", "[hi , a, b]");
    check(
        "<u.id>: <u.name>",
        "load_attr 0, load_prop 1, write, write_str 2, load_attr 0, load_prop 3, write",
        "[u, id, : , name]",
    );
    check("<a.(b)>", "load_attr 0, load_attr 1, load_prop_ind, write", "[a, b]");
    check("<\"x\"><true>", "load_str 0, write, true, write", "[x]");
}

#[test]
fn includes() {
    check("hi <foo()>", "write_str 0, new 1 0, write", "[hi , foo]");
    check(
        "hi <foo(a,b)>",
        "write_str 0, load_attr 1, load_attr 2, new 3 2, write",
        "[hi , a, b, foo]",
    );
    check(
        "hi <foo(...)>",
        "write_str 0, args, passthru 1, new_box_args 1, write",
        "[hi , foo]",
    );
    check(
        "hi <foo(x=y,...)>",
        "write_str 0, args, load_attr 1, store_arg 2, passthru 3, new_box_args 3, write",
        "[hi , y, x, foo]",
    );
    check("<super.foo()>", "super_new 0 0, write", "[foo]");
    check(
        "<super.foo(a,{b})>",
        "load_attr 0, new 1 0, super_new 2 2, write",
        "[a, _sub1, foo]",
    );
    check(
        "<super.foo(x=a,y={b})>",
        "args, load_attr 0, store_arg 1, new 2 0, store_arg 3, super_new_box_args 4, write",
        "[a, x, _sub1, y, foo]",
    );
    check("<({ a, b | <a><b>})>", "new 0 0, tostr, write", "[_sub1]");
    check(
        "hi <(foo)(a,b)>",
        "write_str 0, load_attr 1, tostr, load_attr 2, load_attr 3, new_ind 2, write",
        "[hi , foo, a, b]",
    );
}

#[test]
fn functions() {
    check("<first(names)>", "load_attr 0, first, write", "[names]");
    check(
        "<strlen(trim(x))>",
        "load_attr 0, trim, strlen, write",
        "[x]",
    );
}

#[test]
fn maps() {
    check("<name:bold()>", "load_attr 0, null, new 1 1, map, write", "[name, bold]");
    check(
        "<name:bold(x)>",
        "load_attr 0, null, load_attr 1, new 2 2, map, write",
        "[name, x, bold]",
    );
    check(
        "<name:(t)(x)>",
        "load_attr 0, load_attr 1, tostr, null, load_attr 2, new_ind 2, map, write",
        "[name, t, x]",
    );
    check(
        "<name:bold():italics()>",
        "load_attr 0, null, new 1 1, map, null, new 2 1, map, write",
        "[name, bold, italics]",
    );
    check(
        "<name:bold(x):italics(x,y)>",
        "load_attr 0, null, load_attr 1, new 2 2, map, null, load_attr 1, load_attr 3, new 4 3, \
         map, write",
        "[name, x, bold, y, italics]",
    );
    check(
        "<name:bold(),italics()>",
        "load_attr 0, null, new 1 1, null, new 2 1, rot_map 2, write",
        "[name, bold, italics]",
    );
    check(
        "<name:bold(x),italics()>",
        "load_attr 0, null, load_attr 1, new 2 2, null, new 3 1, rot_map 2, write",
        "[name, x, bold, italics]",
    );
    check(
        "<names,phones:bold()>",
        "load_attr 0, load_attr 1, null, null, new 2 2, zip_map 2, write",
        "[names, phones, bold]",
    );
    check(
        "<names,phones:bold(x)>",
        "load_attr 0, load_attr 1, null, null, load_attr 2, new 3 3, zip_map 2, write",
        "[names, phones, x, bold]",
    );
    check("<name:{n | <n>}>", "load_attr 0, null, new 1 1, map, write", "[name, _sub1]");
    check(
        "<a,b:{x,y | <x><y>}>",
        "load_attr 0, load_attr 1, null, null, new 2 2, zip_map 2, write",
        "[a, b, _sub1]",
    );
}

#[test]
fn options() {
    check(
        "hi <name; separator=\"x\">",
        "write_str 0, load_attr 1, options, load_str 2, store_option 3, write_opt",
        "[hi , name, x]",
    );
    check(
        "hi <name; separator={, }>",
        "write_str 0, load_attr 1, options, new 2 0, store_option 3, write_opt",
        "[hi , name, _sub1]",
    );
    check(
        "hi <name; anchor, wrap=foo(), separator=\", \">",
        "write_str 0, load_attr 1, options, load_str 2, store_option 0, new 3 0, store_option 4, \
         load_str 4, store_option 3, write_opt",
        "[hi , name, true, foo, , ]",
    );
    check(
        "<a; wrap=name:bold()>",
        "load_attr 0, options, load_attr 1, null, new 2 1, map, store_option 4, write_opt",
        "[a, name, bold]",
    );
}

#[test]
fn lists() {
    check("<[]>", "list, write", "[]");
    check(
        "<[a,b]>",
        "list, load_attr 0, add, load_attr 1, add, write",
        "[a, b]",
    );
    check(
        "<[a,,b]>",
        "list, load_attr 0, add, null, add, load_attr 1, add, write",
        "[a, b]",
    );
}

// ═══════════════════════════════════════════════════════════════════
// Conditionals
// ═══════════════════════════════════════════════════════════════════

#[test]
fn if_branches_are_patched() {
    check(
        "go: <if(name)>hi, foo<endif>",
        "write_str 0, load_attr 1, brf 12, write_str 2",
        "[go: , name, hi, foo]",
    );
    check(
        "go: <if(name)>hi, foo<else>bye<endif>",
        "write_str 0, load_attr 1, brf 15, write_str 2, br 18, write_str 3",
        "[go: , name, hi, foo, bye]",
    );
    check(
        "go: <if(name)>hi, foo<elseif(user)>a user<endif>",
        "write_str 0, load_attr 1, brf 15, write_str 2, br 24, load_attr 3, brf 24, write_str 4",
        "[go: , name, hi, foo, user, a user]",
    );
    check(
        "go: <if(name)>hi, foo<elseif(user)>a user<else>bye<endif>",
        "write_str 0, load_attr 1, brf 15, write_str 2, br 30, load_attr 3, brf 27, \
         write_str 4, br 30, write_str 5",
        "[go: , name, hi, foo, user, a user, bye]",
    );
}

#[test]
fn conditions() {
    check(
        "<if(!a&&b||c)>x<endif>",
        "load_attr 0, not, load_attr 1, and, load_attr 2, or, brf 18, write_str 3",
        "[a, b, c, x]",
    );
    check("<if(a)><endif>", "load_attr 0, brf 6", "[a]");
}

#[test]
fn every_branch_lands_on_an_instruction() {
    let (compiler, _) = setup();
    let t = compiler
        .compile("<if(a)>1<elseif(b)>2<elseif(c)>3<else>4<endif>!")
        .unwrap();
    let instrs: Vec<_> = bytecode::BytecodeDecoder::new(t.code())
        .collect::<Result<_, _>>()
        .unwrap();
    let starts: Vec<_> = instrs.iter().map(|i| i.addr).collect();
    for instr in &instrs {
        if matches!(instr.op, bytecode::Op::Br | bytecode::Op::Brf) {
            let target = instr.operands()[0] as usize;
            assert!(starts.contains(&target), "{} jumps to {target}", instr.addr);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════
// Arguments and scopes
// ═══════════════════════════════════════════════════════════════════

#[test]
fn declared_arguments_load_by_slot() {
    let (compiler, errors) = setup();
    let args = vec![FormalArgument::new("a"), FormalArgument::new("b")];
    let t = compiler.compile_with_args("t", args, "<b><a><c>").unwrap();
    assert!(errors.is_empty(), "{errors}");
    assert_eq!(
        t.instrs(),
        "load_local 1, write, load_local 0, write, load_attr 0, write"
    );
    assert_eq!(strings(&t), "[c]");
    assert!(t.has_formal_args);
    assert_eq!(t.formal_arguments.as_ref().map(Vec::len), Some(2));
}

#[test]
fn subtemplates_only_see_their_own_arguments() {
    let (compiler, _) = setup();
    let args = vec![FormalArgument::new("a")];
    let t = compiler
        .compile_with_args("t", args, "<a:{x | <x><a><i>}>")
        .unwrap();
    assert_eq!(t.instrs(), "load_local 0, null, new 0 1, map, write");
    let sub = &t.implicitly_defined_templates[0];
    assert_eq!(
        sub.instrs(),
        "load_local 0, write, load_attr 0, write, load_local 1, write"
    );
}

#[test]
fn implicit_attributes_outside_subtemplates() {
    let (compiler, errors) = setup();
    let t = compiler.compile("<i0>").unwrap();
    assert_eq!(t.instrs(), "null, write");
    assert_eq!(
        errors.messages()[0].to_string(),
        "anonymous 1:1: implicitly-defined attribute i0 not visible"
    );
}

#[test]
fn it_is_an_ordinary_attribute() {
    check("<it>", "load_attr 0, write", "[it]");
    check("<xs:{x | <it>}>", "load_attr 0, null, new 1 1, map, write", "[xs, _sub1]");
}

// ═══════════════════════════════════════════════════════════════════
// Nested templates
// ═══════════════════════════════════════════════════════════════════

fn implicit_names(t: &CompiledTemplate) -> Vec<&str> {
    t.implicitly_defined_templates
        .iter()
        .map(|s| s.name.as_str())
        .collect()
}

#[test]
fn subtemplates_are_numbered_in_order() {
    let (compiler, _) = setup();
    let t = compiler.compile("<a:{x|<x>}><b:{y|<y>}>").unwrap();
    assert_eq!(implicit_names(&t), vec!["/_sub1", "/_sub2"]);
    assert!(t.implicitly_defined_templates.iter().all(|s| s.is_anonymous_subtemplate));

    // a fresh compiler starts over
    let (compiler, _) = setup();
    let t = compiler.compile("<c:{z|<z>}>").unwrap();
    assert_eq!(implicit_names(&t), vec!["/_sub1"]);
}

#[test]
fn nested_subtemplates_register_flat() {
    let (compiler, _) = setup();
    let t = compiler.compile("<a:{x|<x:{y|<y>}>}>").unwrap();
    assert_eq!(implicit_names(&t), vec!["/_sub2", "/_sub1"]);
    let outer = &t.implicitly_defined_templates[1];
    assert_eq!(outer.instrs(), "load_local 0, null, new 0 1, map, write");
    assert_eq!(strings(outer), "[_sub2]");
}

#[test]
fn shared_name_allocator() {
    let names = Arc::new(compiler::NameAllocator::new());
    let a = Compiler::default().with_name_allocator(names.clone());
    let b = Compiler::default().with_name_allocator(names.clone());
    a.compile("<{x}>").unwrap();
    let t = b.compile("<{y}>").unwrap();
    assert_eq!(implicit_names(&t), vec!["/_sub2"]);
    assert_eq!(names.issued(), 2);
}

#[test]
fn subtemplate_in_namespace() {
    let (compiler, _) = setup();
    let t = compiler.compile_named("/lib/page", "<{x}>").unwrap();
    assert_eq!(t.prefix, "/lib/");
    assert_eq!(implicit_names(&t), vec!["/lib/_sub1"]);
    assert_eq!(t.implicitly_defined_templates[0].prefix, "/lib/");
}

#[test]
fn blank_subtemplate() {
    let (compiler, _) = setup();
    let t = compiler.compile("<{}>").unwrap();
    assert_eq!(t.instrs(), "new 0 0, write");
    let sub = &t.implicitly_defined_templates[0];
    assert_eq!(sub.code_size, 0);
    assert_eq!(&*sub.template, "");
    let args: Vec<_> = sub
        .formal_arguments
        .iter()
        .flatten()
        .map(|a| a.name.as_str())
        .collect();
    assert_eq!(args, vec!["i", "i0"]);
}

#[test]
fn embedded_region() {
    let (compiler, _) = setup();
    let t = compiler.compile_named("a", "<@r>foo<@end>").unwrap();
    assert_eq!(t.instrs(), "new 0 0, write");
    assert_eq!(strings(&t), "[/region__/a__r]");
    let region = &t.implicitly_defined_templates[0];
    assert_eq!(region.name, "/region__/a__r");
    assert!(region.is_region);
    assert_eq!(region.region_kind, compiler::RegionKind::Embedded);
    assert_eq!(region.instrs(), "write_str 0");
    assert_eq!(
        compiler::unmangled_template_name(&region.name),
        "/a.r"
    );
}

#[test]
fn region_references() {
    let (compiler, _) = setup();
    let t = compiler.compile_named("a", "x:<@r()>").unwrap();
    assert_eq!(t.instrs(), "write_str 0, new 1 0, write");
    assert_eq!(strings(&t), "[x:, /region__/a__r]");
    let blank = &t.implicitly_defined_templates[0];
    assert_eq!(blank.region_kind, compiler::RegionKind::Implicit);
    assert_eq!(blank.code_size, 0);

    let t = compiler.compile_named("a", "<@super.r()>").unwrap();
    assert_eq!(t.instrs(), "super_new 0 0, write");
    assert!(t.implicitly_defined_templates.is_empty());
}

#[test]
fn explicit_region() {
    let (compiler, _) = setup();
    let t = compiler.compile_region("a", "r", "hi <x>").unwrap();
    assert_eq!(t.name, "/region__/a__r");
    assert!(t.is_region);
    assert_eq!(t.region_kind, compiler::RegionKind::Explicit);
    assert_eq!(t.instrs(), "write_str 0, load_attr 1, write");
}

// ═══════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════

#[test]
fn unknown_option_is_reported_and_skipped() {
    let (compiler, errors) = setup();
    let t = compiler.compile("hi <name; foo> <x>").unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.messages()[0].to_string(),
        "anonymous 1:10: no such option: foo"
    );
    assert_eq!(
        t.instrs(),
        "write_str 0, load_attr 1, options, write_opt, write_str 2, load_attr 3, write"
    );
}

#[test]
fn option_without_default() {
    let (compiler, errors) = setup();
    let t = compiler.compile("<name; separator>").unwrap();
    assert_eq!(
        errors.messages()[0].kind,
        ErrorKind::NoDefaultValue("separator".into())
    );
    assert_eq!(t.instrs(), "load_attr 0, options, write_opt");
}

#[test]
fn anonymous_argument_mismatch() {
    let (compiler, errors) = setup();
    let t = compiler.compile("<a:{x|foo},{bar}>").unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors.messages()[0].to_string(),
        "anonymous 1:11: anonymous template has 0 arg(s) but mapped across 1 value(s)"
    );
    assert_eq!(
        t.instrs(),
        "load_attr 0, null, new 1 1, null, new 2 1, rot_map 2, write"
    );
}

#[test]
fn branch_past_operand_range_is_reported() {
    let (compiler, errors) = setup();
    let text = format!("<if(a)>{}<endif>x", "<b>".repeat(9000));
    let t = compiler.compile(&text).unwrap();
    // load_attr and brf, then 9000 load_attr/write pairs
    assert_eq!(t.code_size, 6 + 9000 * 4 + 3);
    assert_eq!(errors.len(), 1, "{errors}");
    let message = &errors.messages()[0];
    assert_eq!(message.kind.category(), Category::Compile);
    assert_eq!(
        message.kind,
        ErrorKind::CodeTooLarge {
            template: "anonymous".into(),
            operand: 36_006,
        }
    );

    let (compiler, errors) = setup();
    compiler
        .compile(&format!("<if(a)>{}<endif>", "<b>".repeat(8000)))
        .unwrap();
    assert!(errors.is_empty(), "{errors}");
}

#[test]
fn syntax_errors_yield_a_stub() {
    let (compiler, errors) = setup();
    let args = vec![FormalArgument::new("x")];
    let t = compiler.compile_with_args("t", args, "<a b>").unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors.messages()[0].kind.category(), Category::Syntax);
    assert_eq!(t.code_size, 0);
    assert_eq!(t.formal_arguments.as_ref().map(Vec::len), Some(1));
    assert_eq!(&*t.template, "<a b>");
}

#[test]
fn premature_eof_aborts() {
    let (compiler, errors) = setup();
    let err = compiler.compile_named("t", "<if(a)>x").unwrap_err();
    assert!(matches!(&err, CompileError::Aborted { template, .. } if template == "t"));
    assert!(err.to_string().contains("premature EOF"), "{err}");
    assert_eq!(errors.len(), 1);
}

// ═══════════════════════════════════════════════════════════════════
// Output shape
// ═══════════════════════════════════════════════════════════════════

#[test]
fn compilation_is_deterministic() {
    let text = "<if(a)><names:{n | <n>}; separator=\", \"><else><foo(x=y)><endif>";
    let (first, _) = setup();
    let (second, _) = setup();
    let a = first.compile(text).unwrap();
    let b = second.compile(text).unwrap();
    assert_eq!(a.code(), b.code());
    assert_eq!(a.strings, b.strings);
    assert_eq!(a.source_map, b.source_map);
    assert_eq!(implicit_names(&a), implicit_names(&b));
}

#[test]
fn buffer_growth_does_not_change_code() {
    let text = "<a><b><c><d><e><f:{x | <x><y><z>}><if(g)><h><else><i0><endif>";
    let compile = |size| {
        let settings = CompilerSettings {
            initial_code_size: size,
            ..CompilerSettings::default()
        };
        Compiler::new(settings).compile(text).unwrap()
    };
    let small = compile(1);
    let large = compile(4096);
    assert_eq!(small.code(), large.code());
    assert_eq!(small.code_size, large.code_size);
    assert_eq!(
        small.source_map[..small.code_size],
        large.source_map[..large.code_size]
    );
}

#[test]
fn string_pool_has_no_duplicates() {
    let (compiler, _) = setup();
    let t = compiler.compile("<a><a><b><a.a>").unwrap();
    assert_eq!(strings(&t), "[a, b]");
    assert_eq!(
        t.instrs(),
        "load_attr 0, write, load_attr 0, write, load_attr 1, write, load_attr 0, load_prop 0, write"
    );
}

#[test]
fn clones_share_code() {
    let (compiler, _) = setup();
    let t = compiler.compile("hi <name>").unwrap();
    let mut copy = t.clone();
    copy.add_arg(FormalArgument::new("extra"));
    assert!(Arc::ptr_eq(&t.instructions, &copy.instructions));
    assert!(Arc::ptr_eq(&t.strings, &copy.strings));
    assert!(t.formal_arguments.is_none());
    assert_eq!(copy.formal_arguments.as_ref().map(Vec::len), Some(1));
}

#[test]
fn custom_delimiters() {
    let errors = Arc::new(ErrorBuffer::new());
    let settings = CompilerSettings {
        delimiter_start: '$',
        delimiter_stop: '$',
        ..CompilerSettings::default()
    };
    let compiler = Compiler::with_listener(settings, errors.clone());
    let t = compiler.compile("hi $name$ <b>").unwrap();
    assert!(errors.is_empty(), "{errors}");
    assert_eq!(t.instrs(), "write_str 0, load_attr 1, write, write_str 2");
    assert_eq!(strings(&t), "[hi , name,  <b>]");
}

#[test]
fn full_listing() {
    let (compiler, _) = setup();
    let t = compiler.compile("hi <name>").unwrap();
    assert_eq!(
        t.disasm(),
        "0000:\twrite_str     #0:\"hi \"\n\
         0003:\tload_attr     #1:\"name\"\n\
         0006:\twrite           \n\
         \n\
         Strings:\n\
         0000: \"hi \"\n\
         0001: \"name\"\n\
         \n\
         Bytecode to template map:\n\
         0000: 0..3\t\"hi \"\n\
         0003: 4..8\t\"name\"\n\
         0006: 3..9\t\"<name>\"\n\
         \n"
    );
}

#[test]
fn encoded_source_map_round_trips_lookups() {
    let (compiler, _) = setup();
    let t = compiler.compile("hi <name>\n<if(x)>y<endif>").unwrap();
    let encoded = t.encoded_source_map();
    for addr in 0..t.code_size {
        assert_eq!(
            bytecode::source_map::lookup_encoded(&encoded, addr),
            t.source_span_at(addr),
            "address {addr}"
        );
    }
}
