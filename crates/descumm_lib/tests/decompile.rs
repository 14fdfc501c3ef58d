use descumm_lib::{decompile, DecompileOptions, DescummError, ScriptVersion};

fn scrp(body: &[u8]) -> Vec<u8> {
    let mut v = b"SCRP\x00\x00\x00\x00".to_vec();
    v.extend_from_slice(body);
    v
}

fn bare(version: ScriptVersion) -> DecompileOptions {
    DecompileOptions {
        version,
        hide_opcode: true,
        hide_offsets: true,
        ..Default::default()
    }
}

fn run_bare(version: ScriptVersion, body: &[u8]) -> String {
    decompile(&scrp(body), bare(version)).unwrap()
}

#[test]
fn literal_assignment_with_prefixes() {
    let out = decompile(&scrp(&[0x00, 7, 0x43, 0, 0]), DecompileOptions::default()).unwrap();
    assert_eq!(out, "[0000] (43) var0 = 7\nEND\nStack count: 0\n");
}

#[test]
fn arithmetic_keeps_explicit_parens() {
    let out = run_bare(
        ScriptVersion::V6,
        &[0x00, 2, 0x00, 3, 0x00, 5, 0x16, 0x14, 0x43, 0, 0],
    );
    assert_eq!(out, "var0 = (2 + (3 * 5))\nEND\nStack count: 0\n");
}

#[test]
fn simple_if_block() {
    let out = run_bare(ScriptVersion::V6, &[0x00, 1, 0x5D, 5, 0, 0x00, 9, 0x43, 0, 0]);
    assert_eq!(out, "if (1) {\n  var0 = 9\n}\nEND\nStack count: 0\n");
}

#[test]
fn simple_if_block_with_offsets_and_opcodes() {
    let out = decompile(
        &scrp(&[0x00, 1, 0x5D, 5, 0, 0x00, 9, 0x43, 0, 0]),
        DecompileOptions::default(),
    )
    .unwrap();
    assert_eq!(
        out,
        "[0000] (5D) if (1) {\n\
         [0005] (43)   var0 = 9\n\
         [000A] (**) }\n\
         END\n\
         Stack count: 0\n"
    );
}

#[test]
fn jump_if_true_negates_predicate() {
    let out = run_bare(ScriptVersion::V6, &[0x00, 1, 0x5C, 5, 0, 0x00, 9, 0x43, 0, 0]);
    assert_eq!(out, "if (!1) {\n  var0 = 9\n}\nEND\nStack count: 0\n");
}

#[test]
fn if_else_blocks() {
    let body = [
        0x00, 1, // push 1
        0x5D, 8, 0, // if (1), body ends at 13
        0x00, 9, 0x43, 0, 0, // var0 = 9
        0x73, 5, 0, // jump over the false branch to 18
        0x00, 8, 0x43, 0, 0, // var0 = 8
    ];
    let out = run_bare(ScriptVersion::V6, &body);
    assert_eq!(
        out,
        "if (1) {\n  var0 = 9\n} else {\n  var0 = 8\n}\nEND\nStack count: 0\n"
    );
}

#[test]
fn else_if_chain() {
    let body = [
        0x00, 1, // push 1
        0x5D, 8, 0, // if (1), to 13
        0x00, 9, 0x43, 0, 0, // var0 = 9
        0x73, 0x12, 0, // jump to 31 (end)
        0x00, 2, // push 2
        0x5D, 8, 0, // else if (2), to 26
        0x00, 8, 0x43, 0, 0, // var0 = 8
        0x73, 5, 0, // jump to 31 (end)
        0x00, 7, 0x43, 0, 0, // var0 = 7
    ];
    let out = run_bare(ScriptVersion::V6, &body);
    assert_eq!(
        out,
        "if (1) {\n\
         \x20 var0 = 9\n\
         } else if (2) {\n\
         \x20 var0 = 8\n\
         } else {\n\
         \x20 var0 = 7\n\
         }\n\
         END\n\
         Stack count: 0\n"
    );
}

#[test]
fn while_loop_from_back_edge() {
    let body = [
        0x00, 1, // push 1
        0x5D, 8, 0, // predicate jump past the body to 13
        0x00, 9, 0x43, 0, 0, // var0 = 9
        0x73, 0xF3, 0xFF, // back edge to offset 0
    ];
    let out = run_bare(ScriptVersion::V6, &body);
    assert_eq!(out, "while (1) {\n  var0 = 9\n}\nEND\nStack count: 0\n");
}

#[test]
fn while_suppression_shows_raw_back_edge() {
    let body = [
        0x00, 1, 0x5D, 8, 0, 0x00, 9, 0x43, 0, 0, 0x73, 0xF3, 0xFF,
    ];
    let opts = DecompileOptions {
        no_while: true,
        ..bare(ScriptVersion::V6)
    };
    let out = decompile(&scrp(&body), opts).unwrap();
    assert_eq!(
        out,
        "if (1) {\n  var0 = 9\n  jump 0\n}\nEND\nStack count: 0\n"
    );
}

#[test]
fn while_loop_v8_wide_jumps() {
    let body = [
        0x01, 1, 0, 0, 0, // push 1
        0x65, 15, 0, 0, 0, // predicate jump to 25
        0x01, 9, 0, 0, 0, // push 9
        0x6D, 0, 0, 0, 0, // var0 = 9
        0x66, 0xE7, 0xFF, 0xFF, 0xFF, // back edge to offset 0
    ];
    let out = run_bare(ScriptVersion::V8, &body);
    assert_eq!(out, "while (1) {\n  var0 = 9\n}\nEND\nStack count: 0\n");
}

#[test]
fn nested_if_blocks_balance_braces() {
    let body = [
        0x00, 1, // push 1
        0x5D, 15, 0, // outer if, to 20
        0x00, 2, // push 2
        0x5D, 5, 0, // inner if, to 15
        0x00, 9, 0x43, 0, 0, // var0 = 9
        0x00, 8, 0x43, 0, 0, // var0 = 8
    ];
    let out = run_bare(ScriptVersion::V6, &body);
    assert_eq!(
        out,
        "if (1) {\n\
         \x20 if (2) {\n\
         \x20   var0 = 9\n\
         \x20 }\n\
         \x20 var0 = 8\n\
         }\n\
         END\n\
         Stack count: 0\n"
    );
    assert_eq!(out.matches('{').count(), out.matches('}').count());
}

#[test]
fn jump_crossing_enclosing_block_stays_goto() {
    let body = [
        0x00, 1, // push 1
        0x5D, 8, 0, // if (1), to 13
        0x00, 2, // push 2
        0x5C, 8, 0, // jump to 18 would cross the enclosing block
        0x00, 9, 0x43, 0, 0, // var0 = 9
    ];
    let out = run_bare(ScriptVersion::V6, &body);
    assert_eq!(
        out,
        "if (1) {\n  if (2) goto 12\n  var0 = 9\n}\nEND\nStack count: 0\n"
    );
}

#[test]
fn unstructured_jumps_render_as_goto() {
    let out = run_bare(ScriptVersion::V6, &[0x73, 2, 0]);
    assert_eq!(out, "jump 5\nEND\nStack count: 0\n");

    let out = run_bare(ScriptVersion::V6, &[0x00, 1, 0x5C, 0xFB, 0xFF]);
    assert_eq!(out, "if (1) goto 0\nEND\nStack count: 0\n");

    let out = run_bare(ScriptVersion::V6, &[0x00, 1, 0x5D, 0xFB, 0xFF]);
    assert_eq!(out, "if (!1) goto 0\nEND\nStack count: 0\n");
}

#[test]
fn block_headers_can_carry_target_offsets() {
    let body = [
        0x00, 1, 0x5D, 8, 0, 0x00, 9, 0x43, 0, 0, 0x73, 5, 0, 0x00, 8, 0x43, 0, 0,
    ];
    let opts = DecompileOptions {
        always_show_offsets: true,
        ..bare(ScriptVersion::V6)
    };
    let out = decompile(&scrp(&body), opts).unwrap();
    assert_eq!(
        out,
        "if (1) /*000D*/ {\n\
         \x20 var0 = 9\n\
         } else /*0012*/ {\n\
         \x20 var0 = 8\n\
         }\n\
         END\n\
         Stack count: 0\n"
    );
}

#[test]
fn if_suppression_leaves_gotos() {
    let opts = DecompileOptions {
        no_if: true,
        ..bare(ScriptVersion::V6)
    };
    let out = decompile(&scrp(&[0x00, 1, 0x5D, 5, 0, 0x00, 9, 0x43, 0, 0]), opts).unwrap();
    assert_eq!(out, "if (!1) goto a\nvar0 = 9\nEND\nStack count: 0\n");
}

#[test]
fn dup_names_the_value_once_and_kill_is_silent() {
    let body = [
        0x02, 1, // push g_ego
        0x0C, // dup
        0x43, 0, 0, // var0 = dup[1]
        0x1A, // discard the unused copy
    ];
    let out = run_bare(ScriptVersion::V6, &body);
    assert_eq!(
        out,
        "dup[1] = g_ego\n\
         var0 = dup[1]\n\
         END\n\
         Stack count: 1\n\
         Stack contents:\n\
         dup[1]\n"
    );
}

#[test]
fn kill_of_plain_value_prints_pop() {
    let out = run_bare(ScriptVersion::V6, &[0x00, 5, 0x1A]);
    assert_eq!(out, "pop(5)\nEND\nStack count: 0\n");
}

#[test]
fn named_call_with_stack_list() {
    let out = run_bare(ScriptVersion::V6, &[0x00, 8, 0x00, 5, 0x00, 1, 0x5F]);
    assert_eq!(out, "startScript(8,[5])\nEND\nStack count: 0\n");
}

#[test]
fn value_returning_call_feeds_the_stack() {
    let out = run_bare(ScriptVersion::V6, &[0x00, 5, 0x87, 0x43, 0, 0]);
    assert_eq!(out, "var0 = getRandomNumber(5)\nEND\nStack count: 0\n");
}

#[test]
fn is_any_of_reverses_list_and_operand() {
    let body = [0x00, 5, 0x00, 1, 0x00, 2, 0x00, 2, 0xAD, 0x43, 0, 0];
    let out = run_bare(ScriptVersion::V6, &body);
    assert_eq!(out, "var0 = isAnyOf(5,[1,2])\nEND\nStack count: 0\n");
}

#[test]
fn print_family_uses_menu_prefix() {
    let body = [0xB4, 0x4B, b'H', b'i', 0, 0xB4, 0xFF];
    let out = run_bare(ScriptVersion::V6, &body);
    assert_eq!(
        out,
        "print_0_msg(\"Hi\")\nprint_0_end()\nEND\nStack count: 0\n"
    );
}

#[test]
fn inline_string_markup() {
    let out = run_bare(ScriptVersion::V6, &[0xBB, b'H', b'i', 0xFF, 3, b'!', 0]);
    assert_eq!(out, "talkEgo(\"Hi\":wait:\"!\")\nEND\nStack count: 0\n");

    let out = run_bare(ScriptVersion::V6, &[0xBB, 0xFF, 4, 1, 0, 0]);
    assert_eq!(out, "talkEgo(:g_ego:)\nEND\nStack count: 0\n");

    let out = run_bare(ScriptVersion::V6, &[0xBB, 0xFF, 9, 7, 0, 0]);
    assert_eq!(out, "talkEgo(:startanim=7:)\nEND\nStack count: 0\n");
}

#[test]
fn room_obj_atom_pops_twice_before_v7() {
    let out = run_bare(ScriptVersion::V6, &[0x00, 1, 0x00, 2, 0x84]);
    assert_eq!(out, "pickupObject(1,2)\nEND\nStack count: 0\n");

    let out = run_bare(ScriptVersion::V7, &[0x00, 2, 0x84]);
    assert_eq!(out, "pickupObject(2)\nEND\nStack count: 0\n");
}

#[test]
fn camera_calls_grow_an_operand_on_v7() {
    let out = run_bare(ScriptVersion::V6, &[0x00, 5, 0x78]);
    assert_eq!(out, "panCameraTo(5)\nEND\nStack count: 0\n");

    let out = run_bare(ScriptVersion::V7, &[0x00, 4, 0x00, 5, 0x78]);
    assert_eq!(out, "panCameraTo(4,5)\nEND\nStack count: 0\n");
}

#[test]
fn v8_assignment_and_modulo() {
    let body = [
        0x01, 7, 0, 0, 0, 0x01, 3, 0, 0, 0, 0x16, 0x6D, 0, 0, 0, 0,
    ];
    let out = run_bare(ScriptVersion::V8, &body);
    assert_eq!(out, "var0 = (7 % 3)\nEND\nStack count: 0\n");
}

#[test]
fn v8_list_selected_sub_opcode() {
    let body = [0x01, 0x1F, 0, 0, 0, 0x01, 1, 0, 0, 0, 0xBA];
    let out = run_bare(ScriptVersion::V8, &body);
    assert_eq!(out, "stopAllVideo([])\nEND\nStack count: 0\n");
}

#[test]
fn operator_table_v6() {
    let cases: &[(u8, &str)] = &[
        (0x0E, "=="),
        (0x0F, "!="),
        (0x10, ">"),
        (0x11, "<"),
        (0x12, "<="),
        (0x13, ">="),
        (0x14, "+"),
        (0x15, "-"),
        (0x16, "*"),
        (0x17, "/"),
        (0x18, "&&"),
        (0x19, "||"),
        (0xD6, "&"),
        (0xD7, "|"),
    ];
    for &(op, text) in cases {
        let out = run_bare(ScriptVersion::V6, &[0x00, 3, 0x00, 5, op, 0x43, 0, 0]);
        assert_eq!(out, format!("var0 = (3 {text} 5)\nEND\nStack count: 0\n"));
    }
}

#[test]
fn operator_table_v8() {
    let texts = [
        "==", "!=", ">", "<", "<=", ">=", "+", "-", "*", "/", "&&", "||", "&", "|", "%",
    ];
    for (i, text) in texts.iter().enumerate() {
        let body = [
            0x01, 3, 0, 0, 0, 0x01, 5, 0, 0, 0, 0x08 + i as u8, 0x6D, 0, 0, 0, 0,
        ];
        let out = run_bare(ScriptVersion::V8, &body);
        assert_eq!(out, format!("var0 = (3 {text} 5)\nEND\nStack count: 0\n"));
    }
}

#[test]
fn zero_test_renders_prefix_operator() {
    let out = run_bare(ScriptVersion::V6, &[0x00, 5, 0x0D, 0x43, 0, 0]);
    assert_eq!(out, "var0 = 0== 5\nEND\nStack count: 0\n");
}

#[test]
fn leftover_stack_is_dumped_in_pop_order() {
    let out = run_bare(ScriptVersion::V6, &[0x00, 1, 0x00, 2, 0x02, 3]);
    assert_eq!(
        out,
        "END\nStack count: 3\nStack contents:\nvar3\n2\n1\n"
    );
}

#[test]
fn increments_and_decrements() {
    let out = run_bare(ScriptVersion::V6, &[0x4E, 0]);
    assert_eq!(out, "var0 += 1\nEND\nStack count: 0\n");

    let out = run_bare(ScriptVersion::V6, &[0x57, 1, 0]);
    assert_eq!(out, "g_ego += -1\nEND\nStack count: 0\n");

    let out = run_bare(ScriptVersion::V6, &[0x00, 4, 0x52, 7]);
    assert_eq!(out, "array-7[4] += 1\nEND\nStack count: 0\n");
}

#[test]
fn array_reads_and_writes() {
    // 2-D read into a variable.
    let out = run_bare(ScriptVersion::V6, &[0x00, 2, 0x00, 3, 0x0A, 9, 0x43, 0, 0]);
    assert_eq!(out, "var0 = array-9[2][3]\nEND\nStack count: 0\n");

    // 1-D write: value on top, then the index.
    let out = run_bare(ScriptVersion::V6, &[0x00, 4, 0x00, 8, 0x46, 9]);
    assert_eq!(out, "array-9[4] = 8\nEND\nStack count: 0\n");

    // 2-D write.
    let out = run_bare(
        ScriptVersion::V6,
        &[0x00, 2, 0x00, 3, 0x00, 8, 0x4A, 9],
    );
    assert_eq!(out, "array-9[2][3] = 8\nEND\nStack count: 0\n");
}

#[test]
fn local_and_bit_variables() {
    let out = run_bare(ScriptVersion::V6, &[0x03, 0x05, 0x40, 0x43, 0x03, 0x80]);
    assert_eq!(out, "bitvar3 = localvar5\nEND\nStack count: 0\n");
}

#[test]
fn stack_underflow_patches_output_by_default() {
    let out = run_bare(ScriptVersion::V6, &[0x1A]);
    assert_eq!(
        out,
        "No items on stack to pop!\npop(**** INVALID DATA ****)\nEND\nStack count: 0\n"
    );
}

#[test]
fn stack_underflow_halts_when_asked() {
    let opts = DecompileOptions {
        halt_on_error: true,
        ..bare(ScriptVersion::V6)
    };
    let err = decompile(&scrp(&[0x1A]), opts).unwrap_err();
    assert!(matches!(err, DescummError::StackUnderflow));
    assert_eq!(err.to_string(), "No items on stack to pop!");
}

#[test]
fn unknown_opcode_is_fatal() {
    let err = decompile(&scrp(&[0xFF]), bare(ScriptVersion::V6)).unwrap_err();
    assert!(matches!(err, DescummError::InvalidOpcode { op: 0xFF, depth: 0 }));
    assert_eq!(err.to_string(), "invalid opcode 0xff (stack count 0)");
}

#[test]
fn unknown_sub_opcode_names_the_menu() {
    let err = decompile(&scrp(&[0x6B, 0x01]), bare(ScriptVersion::V6)).unwrap_err();
    assert_eq!(
        err.to_string(),
        "invalid opcode cursorCommand:0x1 (stack count 0)"
    );
}

#[test]
fn non_literal_list_count_is_fatal() {
    let err = decompile(&scrp(&[0x02, 1, 0xAC]), bare(ScriptVersion::V6)).unwrap_err();
    assert!(matches!(err, DescummError::NonLiteralListCount));
}

#[test]
fn partial_output_survives_an_abort() {
    let mut out = Vec::new();
    let data = scrp(&[0x00, 7, 0x43, 0, 0, 0xFF]);
    let err = descumm_lib::decompile_to(&data, bare(ScriptVersion::V6), &mut out).unwrap_err();
    assert!(matches!(err, DescummError::InvalidOpcode { .. }));
    assert_eq!(String::from_utf8_lossy(&out), "var0 = 7\n");
}

#[test]
fn local_script_header_v6() {
    let mut data = b"LSCR\x00\x00\x00\x00".to_vec();
    data.push(42);
    data.extend_from_slice(&[0x00, 7, 0x43, 0, 0]);
    let out = decompile(&data, bare(ScriptVersion::V6)).unwrap();
    assert_eq!(out, "Script# 42\nvar0 = 7\nEND\nStack count: 0\n");
}

#[test]
fn local_script_header_v7() {
    let mut data = b"LSCR\x00\x00\x00\x00".to_vec();
    data.extend_from_slice(&[0x2A, 0x01]);
    data.extend_from_slice(&[0x00, 7, 0x43, 0, 0]);
    let out = decompile(&data, bare(ScriptVersion::V7)).unwrap();
    assert_eq!(out, "Script# 298\nvar0 = 7\nEND\nStack count: 0\n");
}

#[test]
fn local_script_header_v8_is_rejected() {
    let mut data = b"LSCR\x00\x00\x00\x00".to_vec();
    data.extend_from_slice(&[0x00, 0x00]);
    let err = decompile(&data, bare(ScriptVersion::V8)).unwrap_err();
    assert!(matches!(err, DescummError::UnknownScriptType));
}

#[test]
fn verb_container_lists_events() {
    let mut data = b"VERB\x00\x00\x00\x00".to_vec();
    data.extend_from_slice(&[0x09, 0x0C, 0x00, 0x00]);
    data.extend_from_slice(&[0x00, 7, 0x43, 0, 0]);
    let out = decompile(&data, bare(ScriptVersion::V6)).unwrap();
    assert_eq!(
        out,
        "Events:\n   9 - 0000\nvar0 = 7\nEND\nStack count: 0\n"
    );
}

#[test]
fn unknown_container_tag_is_rejected() {
    let err = decompile(b"XXXX\x00\x00\x00\x00", bare(ScriptVersion::V6)).unwrap_err();
    assert!(matches!(err, DescummError::UnknownScriptType));
    assert_eq!(err.to_string(), "Unknown script type!");

    let err = decompile(b"SCR", bare(ScriptVersion::V6)).unwrap_err();
    assert!(matches!(err, DescummError::UnknownScriptType));
}
