//! Whitespace-control pass.
//!
//! Runs over the fully built tree, text node by text node, applying two
//! independent mechanisms:
//!
//! 1. Explicit `~` strip markers trim the whole adjacent whitespace run
//!    (spaces, tabs, newlines).
//! 2. The standalone heuristic (disabled by `preserve_whitespace`): when a
//!    block's open tag, `{{else}}`, or close tag is the only non-whitespace
//!    content on its line, the line's leading indentation before the tag
//!    and the single newline after it are removed.
//!
//! Only `TextNode.chars` is edited; nodes emptied by either mechanism are
//! deleted afterwards. `left_stripped`/`right_stripped` flags make the
//! single-newline removal idempotent, so re-running the pass is a no-op.

use crate::ast::{BlockStatement, Program, Statement};
use crate::ParseOptions;

/// Strip behavior a statement exposes to its siblings.
struct StripInfo {
    open: bool,
    close: bool,
    open_standalone: bool,
    close_standalone: bool,
}

/// Apply the whitespace-control pass to a program in place.
pub fn process(program: &mut Program, options: &ParseOptions) {
    let standalone = !options.preserve_whitespace;
    walk(&mut program.body, true, standalone);
    sweep(&mut program.body);
}

fn walk(body: &mut Vec<Statement>, is_root: bool, standalone: bool) {
    for i in 0..body.len() {
        let info = match &mut body[i] {
            Statement::Block(block) => Some(visit_block(block, standalone)),
            Statement::Mustache(m) => Some(StripInfo {
                open: m.strip.open,
                close: m.strip.close,
                open_standalone: false,
                close_standalone: false,
            }),
            Statement::MustacheComment(c) => Some(StripInfo {
                open: c.strip.open,
                close: c.strip.close,
                open_standalone: false,
                close_standalone: false,
            }),
            Statement::Element(el) => {
                walk(&mut el.children, false, standalone);
                None
            }
            _ => None,
        };
        let Some(info) = info else { continue };

        let prev_whitespace = is_prev_whitespace(body, Some(i), is_root);
        let next_whitespace = is_next_whitespace(body, Some(i), is_root);

        if info.close {
            omit_right(body, Some(i), true);
        }
        if info.open {
            omit_left(body, Some(i), true);
        }

        if standalone {
            if info.open_standalone && prev_whitespace {
                // Strip the newline at the start of the block's own body,
                // and the indentation before the open tag.
                if let Statement::Block(block) = &mut body[i] {
                    omit_right(&mut block.program.body, None, false);
                }
                omit_left(body, Some(i), false);
            }
            if info.close_standalone && next_whitespace {
                omit_right(body, Some(i), false);
                if let Statement::Block(block) = &mut body[i] {
                    match &mut block.inverse {
                        Some(inverse) => omit_left(&mut inverse.body, None, false),
                        None => omit_left(&mut block.program.body, None, false),
                    }
                }
            }
        }
    }
}

fn visit_block(block: &mut BlockStatement, standalone: bool) -> StripInfo {
    walk(&mut block.program.body, false, standalone);
    if let Some(inverse) = &mut block.inverse {
        walk(&mut inverse.body, false, standalone);
    }

    // Block-internal boundaries: the open tag's inner side, both sides of
    // `{{else}}`, and the close tag's inner side.
    if block.open_strip.close {
        omit_right(&mut block.program.body, None, true);
    }
    match &mut block.inverse {
        Some(inverse) => {
            if block.inverse_strip.open {
                omit_left(&mut block.program.body, None, true);
            }
            if block.inverse_strip.close {
                omit_right(&mut inverse.body, None, true);
            }
            if block.close_strip.open {
                omit_left(&mut inverse.body, None, true);
            }
            // Standalone `{{else}}` line.
            if standalone
                && is_prev_whitespace(&block.program.body, None, false)
                && is_next_whitespace(&inverse.body, None, false)
            {
                omit_left(&mut block.program.body, None, false);
                omit_right(&mut inverse.body, None, false);
            }
        }
        None => {
            if block.close_strip.open {
                omit_left(&mut block.program.body, None, true);
            }
        }
    }

    StripInfo {
        open: block.open_strip.open,
        close: block.close_strip.close,
        open_standalone: is_next_whitespace(&block.program.body, None, false),
        close_standalone: is_prev_whitespace(
            block
                .inverse
                .as_ref()
                .map(|inverse| &inverse.body)
                .unwrap_or(&block.program.body),
            None,
            false,
        ),
    }
}

/// Does the sibling before `i` end on a blank line? With `i` `None`, asks
/// about the end of the body. At the root's edge (no further sibling) a
/// whitespace-only text node counts.
fn is_prev_whitespace(body: &[Statement], i: Option<usize>, is_root: bool) -> bool {
    let i = i.unwrap_or(body.len());
    if i == 0 {
        return is_root;
    }
    let Some(Statement::Text(prev)) = body.get(i - 1) else {
        return false;
    };
    let rest = prev.chars.trim_end_matches([' ', '\t']);
    if rest.ends_with('\n') {
        return true;
    }
    let has_sibling = i >= 2;
    if has_sibling || !is_root {
        false
    } else {
        rest.is_empty()
    }
}

/// Does the sibling after `i` start with a blank line? With `i` `None`,
/// asks about the start of the body.
fn is_next_whitespace(body: &[Statement], i: Option<usize>, is_root: bool) -> bool {
    let idx = match i {
        Some(i) => i + 1,
        None => 0,
    };
    if idx >= body.len() {
        return is_root;
    }
    let Some(Statement::Text(next)) = body.get(idx) else {
        return false;
    };
    let rest = next.chars.trim_start_matches([' ', '\t']);
    if rest.starts_with('\n') || rest.starts_with("\r\n") {
        return true;
    }
    let has_sibling = idx + 1 < body.len();
    if has_sibling || !is_root {
        false
    } else {
        rest.is_empty()
    }
}

/// Trim the start of the text node after `i` (or the body's first node).
/// `multiple` removes the whole whitespace run; otherwise only the line's
/// indentation and a single newline, at most once per node side.
fn omit_right(body: &mut [Statement], i: Option<usize>, multiple: bool) {
    let idx = match i {
        Some(i) => i + 1,
        None => 0,
    };
    let Some(Statement::Text(text)) = body.get_mut(idx) else {
        return;
    };
    if !multiple && text.right_stripped {
        return;
    }
    let stripped = if multiple {
        text.chars.trim_start().to_string()
    } else {
        strip_leading_blank_line(&text.chars)
    };
    if stripped.len() != text.chars.len() {
        text.right_stripped = true;
    }
    text.chars = stripped;
}

/// Trim the end of the text node before `i` (or the body's last node).
/// `multiple` removes the whole whitespace run; otherwise only trailing
/// indentation, at most once per node side.
fn omit_left(body: &mut [Statement], i: Option<usize>, multiple: bool) {
    let idx = match i {
        Some(0) => return,
        Some(i) => i - 1,
        None => match body.len() {
            0 => return,
            len => len - 1,
        },
    };
    let Some(Statement::Text(text)) = body.get_mut(idx) else {
        return;
    };
    if !multiple && text.left_stripped {
        return;
    }
    let stripped = if multiple {
        text.chars.trim_end().to_string()
    } else {
        text.chars.trim_end_matches([' ', '\t']).to_string()
    };
    if stripped.len() != text.chars.len() {
        text.left_stripped = true;
    }
    text.chars = stripped;
}

/// Remove leading spaces/tabs followed by one newline. Leaves the text
/// untouched when no newline follows the indentation.
fn strip_leading_blank_line(chars: &str) -> String {
    let rest = chars.trim_start_matches([' ', '\t']);
    if let Some(after) = rest.strip_prefix("\r\n") {
        after.to_string()
    } else if let Some(after) = rest.strip_prefix('\n') {
        after.to_string()
    } else {
        chars.to_string()
    }
}

/// Delete text nodes emptied by the pass.
fn sweep(body: &mut Vec<Statement>) {
    body.retain(|stmt| !matches!(stmt, Statement::Text(t) if t.chars.is_empty()));
    for stmt in body.iter_mut() {
        match stmt {
            Statement::Element(el) => sweep(&mut el.children),
            Statement::Block(block) => {
                sweep(&mut block.program.body);
                if let Some(inverse) = &mut block.inverse {
                    sweep(&mut inverse.body);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BlockStatement, ElementNode, Statement};
    use crate::Parser;
    use pretty_assertions::assert_eq;

    fn parse(source: &str) -> Program {
        Parser::parse(source).unwrap()
    }

    fn parse_preserved(source: &str) -> Program {
        Parser::parse_with_options(
            source,
            ParseOptions {
                preserve_whitespace: true,
            },
        )
        .unwrap()
    }

    fn first_block(program: &Program) -> &BlockStatement {
        match &program.body[0] {
            Statement::Block(b) => b,
            other => panic!("Expected Block, got {other:?}"),
        }
    }

    fn text_chars(stmt: &Statement) -> &str {
        match stmt {
            Statement::Text(t) => &t.chars,
            other => panic!("Expected Text, got {other:?}"),
        }
    }

    fn element(stmt: &Statement) -> &ElementNode {
        match stmt {
            Statement::Element(el) => el,
            other => panic!("Expected Element, got {other:?}"),
        }
    }

    // =========================================================================
    // Explicit strip markers: mustaches
    // =========================================================================

    #[test]
    fn test_strip_before_mustache() {
        let program = parse("foo {{~content}} bar");
        assert_eq!(program.body.len(), 3);
        assert_eq!(text_chars(&program.body[0]), "foo");
        assert_eq!(text_chars(&program.body[2]), " bar");
    }

    #[test]
    fn test_strip_after_mustache() {
        let program = parse("foo {{content~}} bar");
        assert_eq!(text_chars(&program.body[0]), "foo ");
        assert_eq!(text_chars(&program.body[2]), "bar");
    }

    #[test]
    fn test_strip_removes_newlines_too() {
        let program = parse("foo \n\n{{~content}}");
        assert_eq!(text_chars(&program.body[0]), "foo");
    }

    #[test]
    fn test_strip_around_mustache_comment() {
        let program = parse("a {{~! note ~}} b");
        assert_eq!(text_chars(&program.body[0]), "a");
        assert!(matches!(
            &program.body[1],
            Statement::MustacheComment(c) if c.value == " note "
        ));
        assert_eq!(text_chars(&program.body[2]), "b");
    }

    // =========================================================================
    // Explicit strip markers: blocks
    // =========================================================================

    #[test]
    fn test_strip_before_block_open() {
        let program = parse("foo {{~#wat}}{{/wat}} bar");
        assert_eq!(text_chars(&program.body[0]), "foo");
        assert_eq!(text_chars(&program.body[2]), " bar");
    }

    #[test]
    fn test_strip_after_block_close() {
        let program = parse("foo {{#wat}}{{/wat~}} bar");
        assert_eq!(text_chars(&program.body[0]), "foo ");
        assert_eq!(text_chars(&program.body[2]), "bar");
    }

    // =========================================================================
    // Explicit strip markers: program boundaries
    // =========================================================================

    #[test]
    fn test_strip_inside_block_open() {
        let program = parse("{{#wat~}} foo {{else}}{{/wat}}");
        let block = first_block(&program);
        assert_eq!(text_chars(&block.program.body[0]), "foo ");
        assert!(block.inverse.as_ref().unwrap().body.is_empty());
    }

    #[test]
    fn test_strip_before_else() {
        let program = parse("{{#wat}} foo {{~else}}{{/wat}}");
        let block = first_block(&program);
        assert_eq!(text_chars(&block.program.body[0]), " foo");
    }

    #[test]
    fn test_strip_after_else() {
        let program = parse("{{#wat}}{{else~}} foo {{/wat}}");
        let block = first_block(&program);
        assert!(block.program.body.is_empty());
        assert_eq!(
            text_chars(&block.inverse.as_ref().unwrap().body[0]),
            "foo "
        );
    }

    #[test]
    fn test_strip_inside_block_close() {
        let program = parse("{{#wat}}{{else}} foo {{~/wat}}");
        let block = first_block(&program);
        assert_eq!(
            text_chars(&block.inverse.as_ref().unwrap().body[0]),
            " foo"
        );
    }

    #[test]
    fn test_strip_removes_emptied_text_nodes() {
        let program = parse("{{#each~}}\n  <li> foo </li>\n{{~/each}}");
        let block = first_block(&program);
        assert_eq!(block.program.body.len(), 1);
        let li = element(&block.program.body[0]);
        assert_eq!(text_chars(&li.children[0]), " foo ");
    }

    // =========================================================================
    // Standalone heuristic
    // =========================================================================

    #[test]
    fn test_standalone_block_lines() {
        let program = parse("{{#each}}\n  <li> foo </li>\n{{/each}}");
        let block = first_block(&program);
        let body = &block.program.body;
        assert_eq!(body.len(), 3);
        assert_eq!(text_chars(&body[0]), "  ");
        assert_eq!(element(&body[1]).tag, "li");
        assert_eq!(text_chars(&element(&body[1]).children[0]), " foo ");
        assert_eq!(text_chars(&body[2]), "\n");
    }

    #[test]
    fn test_preserve_whitespace_option() {
        let program = parse_preserved("{{#each}}\n  <li> foo </li>\n{{/each}}");
        let block = first_block(&program);
        let body = &block.program.body;
        assert_eq!(text_chars(&body[0]), "\n  ");
        assert_eq!(text_chars(&body[2]), "\n");
    }

    #[test]
    fn test_standalone_with_surrounding_text() {
        let program = parse("x\n{{#if foo}}\ny\n{{/if}}\nz");
        assert_eq!(program.body.len(), 3);
        assert_eq!(text_chars(&program.body[0]), "x\n");
        let block = match &program.body[1] {
            Statement::Block(b) => b,
            other => panic!("Expected Block, got {other:?}"),
        };
        assert_eq!(text_chars(&block.program.body[0]), "y\n");
        assert_eq!(text_chars(&program.body[2]), "z");
    }

    #[test]
    fn test_standalone_indented_lines() {
        let program = parse("  {{#if foo}}\n  y\n  {{/if}}  \n");
        assert_eq!(program.body.len(), 1);
        let block = first_block(&program);
        assert_eq!(text_chars(&block.program.body[0]), "  y\n");
    }

    #[test]
    fn test_standalone_else_line() {
        let program = parse("{{#if foo}}\na\n{{else}}\nb\n{{/if}}");
        let block = first_block(&program);
        assert_eq!(text_chars(&block.program.body[0]), "a\n");
        assert_eq!(
            text_chars(&block.inverse.as_ref().unwrap().body[0]),
            "b\n"
        );
    }

    #[test]
    fn test_inline_block_keeps_whitespace() {
        let program = parse("a {{#if foo}} b {{/if}} c");
        assert_eq!(text_chars(&program.body[0]), "a ");
        let block = match &program.body[1] {
            Statement::Block(b) => b,
            other => panic!("Expected Block, got {other:?}"),
        };
        assert_eq!(text_chars(&block.program.body[0]), " b ");
        assert_eq!(text_chars(&program.body[2]), " c");
    }

    #[test]
    fn test_mustache_lines_are_not_standalone() {
        // Only block boundaries participate in the standalone heuristic.
        let program = parse("a\n{{foo}}\nb");
        assert_eq!(program.body.len(), 3);
        assert_eq!(text_chars(&program.body[0]), "a\n");
        assert_eq!(text_chars(&program.body[2]), "\nb");
    }

    // =========================================================================
    // Idempotence
    // =========================================================================

    #[test]
    fn test_pass_is_idempotent() {
        let sources = [
            "{{#each}}\n  <li> foo </li>\n{{/each}}",
            "x\n{{#if foo}}\n\ny\n{{/if}}\nz",
            "foo {{~content~}} bar",
            "{{#if a}}\na\n{{else}}\nb\n{{/if}}",
        ];
        for source in sources {
            let mut program = Parser::parse(source).unwrap();
            let once = program.clone();
            process(&mut program, &ParseOptions::default());
            assert_eq!(program, once, "pass not idempotent for {source:?}");
        }
    }
}
