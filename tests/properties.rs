//! Property tests over generated list files.

use cmakels::ast::Node;
use cmakels::{FormatOptions, Formatter, ListFile, parse_ast, parse_tokens};
use proptest::prelude::*;

const KEYWORDS: &[&str] = &[
    "function", "endfunction", "macro", "endmacro", "if", "elseif", "else", "endif", "foreach",
    "endforeach", "while", "endwhile",
];

fn identifier_strategy() -> impl Strategy<Value = String> {
    "[A-Za-z_][A-Za-z0-9_]{0,8}".prop_filter("block keyword", |name| {
        !KEYWORDS.contains(&name.to_ascii_lowercase().as_str())
    })
}

fn argument_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        "[A-Za-z0-9_./-]{1,6}",
        "\\$\\{[A-Z_]{1,4}\\}",
        "\"[a-z ]{0,5}\"",
        "\"[a-z]{0,3}\n[a-z]{0,3}\"",
        "\\[=\\[[a-z \\]]{0,5}\\]=\\]",
        Just("(A OR B)".to_string()),
    ]
}

fn separator_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(" ".to_string()),
        Just("   ".to_string()),
        Just("\t".to_string()),
        Just("\n".to_string()),
        Just("\n\n  ".to_string()),
        Just("  # note\n".to_string()),
        Just(" #[[inline]] ".to_string()),
    ]
}

fn arguments_strategy() -> impl Strategy<Value = String> {
    (
        prop::collection::vec((separator_strategy(), argument_strategy()), 0..5),
        prop::option::of(separator_strategy()),
    )
        .prop_map(|(pieces, tail)| {
            let mut out: String = pieces.into_iter().map(|(sep, arg)| sep + &arg).collect();
            out.push_str(&tail.unwrap_or_default());
            out
        })
}

fn line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        4 => (
            "[ \t]{0,3}",
            identifier_strategy(),
            "[ ]?",
            arguments_strategy(),
            prop::option::of("  # [a-z ]{0,6}"),
        )
            .prop_map(|(indent, name, gap, args, comment)| {
                format!("{indent}{name}{gap}({args}){}\n", comment.unwrap_or_default())
            }),
        1 => "[ ]{0,4}# [a-z ]{0,8}\n",
        1 => Just("#[[block\ncomment]]\n".to_string()),
        1 => "[ \t]{0,3}\n",
    ]
}

fn document_strategy() -> impl Strategy<Value = String> {
    let block = line_strategy().prop_recursive(3, 32, 4, |inner| {
        (
            prop_oneof![
                Just(("if", "endif")),
                Just(("foreach", "endforeach")),
                Just(("while", "endwhile")),
                Just(("function", "endfunction")),
                Just(("MACRO", "EndMacro")),
            ],
            arguments_strategy(),
            prop::collection::vec(inner, 0..4),
        )
            .prop_map(|((open, close), args, body)| {
                format!("{open}({args})\n{}  {close}()\n", body.concat())
            })
    });
    prop::collection::vec(block, 0..6).prop_map(|blocks| blocks.concat())
}

/// Case-folded command names and argument values in walk order
fn signature(tree: &ListFile<'_>) -> Vec<(String, Vec<String>)> {
    let mut out = Vec::new();
    let Ok(()) = tree.walk(&mut |node| {
        if let Node::Invocation(_, invocation) = node {
            let args = invocation
                .arguments
                .iter()
                .map(|arg| arg.value.to_string())
                .collect();
            out.push((invocation.name(), args));
        }
        Ok::<_, std::convert::Infallible>(())
    });
    out
}

fn format(text: &str) -> String {
    let stream = parse_tokens(text).unwrap();
    assert!(stream.is_complete(), "unparsed: {:?}", stream.remainder);
    Formatter::new(FormatOptions::default()).format(&stream.tokens)
}

proptest! {
    #[test]
    fn test_token_text_round_trips(doc in document_strategy()) {
        let stream = parse_tokens(&doc).unwrap();
        prop_assert!(stream.is_complete(), "unparsed: {:?}", stream.remainder);
        prop_assert_eq!(stream.source_text(), doc);
    }

    #[test]
    fn test_format_is_idempotent(doc in document_strategy()) {
        let once = format(&doc);
        prop_assert!(once.ends_with('\n'));
        prop_assert_eq!(format(&once), once);
    }

    #[test]
    fn test_format_preserves_commands(doc in document_strategy()) {
        let before = parse_ast(&doc).unwrap();
        prop_assert!(before.remainder.is_empty());

        let formatted = format(&doc);
        let after = parse_ast(&formatted).unwrap();
        prop_assert!(after.remainder.is_empty());
        prop_assert_eq!(signature(&before.tree), signature(&after.tree));
    }
}
