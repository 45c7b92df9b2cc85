//! Failure diagnostics renderer.
//!
//! Builds the two natural-assertion message forms. The comprehensive form
//! reconstructs a column-aligned ASCII diagram: each sub-expression of the
//! failing assertion is re-evaluated against the failing context and its
//! value is printed directly beneath its position in the source expression,
//! with vertical-bar connectors marking positions whose value had to spill
//! onto a later row. Downstream reporters display this text verbatim, so
//! line structure and indentation are a compatibility surface.

use unicode_width::UnicodeWidthStr;

use crate::action::{Action, DiagnosticMeta, Keyword};
use crate::context::Context;
use crate::errors::SpecError;

/// Left margin shared by every body line of a failure message.
const PADDING_LEN: usize = 7;

/// Renders an action as human-readable documentation text: the keyword
/// followed by the attached expression source, or a placeholder when no
/// expression text was captured.
pub fn docify(action: &Action) -> String {
    match action.expression() {
        Some(expression) => format!("{} {}", action.keyword(), expression),
        None => format!("{} <action>", action.keyword()),
    }
}

/// Converts a falsy expectation into a natural-assertion failure, choosing
/// the comprehensive form when diagnostic metadata is attached.
pub fn natural_failure(action: &Action, label: &str, ctx: &Context) -> SpecError {
    match action.meta() {
        Some(meta) => comprehensive_failure(action, label, ctx, meta),
        None => simple_failure(action, label),
    }
}

/// The simple form: the label, plus the failing expression for any keyword
/// other than the bare `Then`.
pub fn simple_failure(action: &Action, label: &str) -> SpecError {
    let mut msg = format!("{}\n", label);
    if action.keyword() != Keyword::Then {
        msg.push_str(&format!(
            "\n       Failing expression: {}\n",
            docify(action)
        ));
    }
    SpecError::expectation_not_met(msg)
}

struct Placed {
    result_str: String,
    /// Horizontal offset: source column minus the expression start column.
    offset: usize,
}

/// The comprehensive form: header, aligned sub-expression diagram, and the
/// binary-comparison footer when the expression is a recognized comparison.
pub fn comprehensive_failure(
    action: &Action,
    label: &str,
    ctx: &Context,
    meta: &DiagnosticMeta,
) -> SpecError {
    let padding = spaces(PADDING_LEN);
    let keyword = action.keyword();
    let keyword_padding_len = keyword.as_str().len() + 3;

    let mut msg = format!("{}\n\n", label);
    msg.push_str(&format!(
        "{}{} expression failed at {}:{}:{}\n\n",
        padding,
        keyword,
        relative_path(&meta.file_path),
        meta.line,
        meta.column
    ));
    msg.push_str(&format!("{}{}\n", padding, docify(action)));

    if meta.evaluators.is_empty() {
        return SpecError::expectation_not_met(msg);
    }

    let mut placed: Vec<Placed> = meta
        .evaluators
        .iter()
        .map(|sub| Placed {
            result_str: (sub.evaluator)(ctx).to_string(),
            offset: sub.column.saturating_sub(meta.column),
        })
        .collect();
    // rightmost sub-expression first
    placed.sort_by(|a, b| b.offset.cmp(&a.offset));

    let mut lines = vec![connector_row(&placed)];
    lines.extend(value_rows(&placed));

    let leftmost_offset = placed.last().map_or(0, |p| p.offset);
    let indent = spaces(PADDING_LEN + keyword_padding_len + leftmost_offset);
    for line in &lines {
        msg.push_str(&format!("{}{}\n", indent, line));
    }
    msg.push('\n');

    if let Some(binary) = &meta.binary {
        let relation = binary.op.relation();
        let align = spaces(relation.len().saturating_sub("expected".len()));
        msg.push_str(&format!(
            "{}{}expected: {}\n",
            padding,
            align,
            (binary.left)(ctx)
        ));
        msg.push_str(&format!("{}{}: {}\n", padding, relation, (binary.right)(ctx)));
    }

    SpecError::expectation_not_met(msg)
}

/// One row of vertical bars, one per distinct sub-expression position,
/// spaced by the offset deltas. Positions sharing an offset collapse into
/// a single bar.
fn connector_row(placed: &[Placed]) -> String {
    let mut row = String::new();
    for idx in 1..placed.len() {
        let delta = placed[idx - 1].offset - placed[idx].offset;
        if delta == 0 {
            continue;
        }
        row = format!("{}|{}", spaces(delta - 1), row);
    }
    format!("|{}", row)
}

/// Lays the value strings out right to left. A value sits inline on the
/// current row, right-aligned against the previously placed value, only if
/// the offset gap strictly exceeds its rendered width; otherwise the
/// position keeps a bar connector and the value anchors a later row.
fn value_rows(placed: &[Placed]) -> Vec<String> {
    let n = placed.len();
    let mut printed = vec![false; n];
    let mut rows = Vec::new();

    for idx in 0..n {
        if printed[idx] {
            continue;
        }
        let mut row = String::new();
        let mut spilled = false;

        for inner in idx..n {
            if inner == idx {
                // rightmost unplaced value anchors this row
                row = format!("{}{}", placed[inner].result_str, row);
                printed[inner] = true;
                continue;
            }
            let gap = placed[inner - 1].offset - placed[inner].offset;
            let width = placed[inner].result_str.as_str().width();
            if !spilled && gap > width {
                row = format!("{}{}", spaces(gap - width), row);
                row = format!("{}{}", placed[inner].result_str, row);
                printed[inner] = true;
            } else {
                spilled = true;
                if gap == 0 {
                    continue;
                }
                row = format!("{}{}", spaces(gap - 1), row);
                row = format!("|{}", row);
            }
        }
        rows.push(row);
    }
    rows
}

fn relative_path(path: &str) -> String {
    match std::env::current_dir() {
        Ok(cwd) => {
            let prefix = format!("{}/", cwd.display());
            path.strip_prefix(&prefix).unwrap_or(path).to_string()
        }
        Err(_) => path.to_string(),
    }
}

fn spaces(n: usize) -> String {
    " ".repeat(n)
}

#[cfg(test)]
mod render_tests {
    use super::*;
    use crate::action::{Action, CompareOp, DiagnosticMeta, Keyword};
    use crate::value::Value;

    fn falsy() -> Action {
        Action::assert(|_| Ok(false))
    }

    #[test]
    fn simple_form_omits_expression_for_bare_then() {
        let action = falsy().with_keyword(Keyword::Then).with_expression("a && b");
        let msg = simple_failure(&action, "Then a && b").to_string();
        assert_eq!(msg, "Then a && b\n");
    }

    #[test]
    fn simple_form_names_the_failing_expression_for_other_keywords() {
        let action = falsy()
            .with_keyword(Keyword::Invariant)
            .with_expression("pool.is_open()");
        let msg = simple_failure(&action, "Then everything works").to_string();
        assert_eq!(
            msg,
            "Then everything works\n\n       Failing expression: Invariant pool.is_open()\n"
        );
    }

    #[test]
    fn comprehensive_header_only_without_evaluators() {
        let action = falsy().with_keyword(Keyword::Then).with_expression("a && b");
        let meta = DiagnosticMeta::new("spec/math.rs", 12, 5);
        let ctx = Context::new();
        let msg = comprehensive_failure(&action, "Then a && b", &ctx, &meta).to_string();
        assert_eq!(
            msg,
            "Then a && b\n\n       Then expression failed at spec/math.rs:12:5\n\n       Then a && b\n"
        );
    }

    #[test]
    fn two_value_diagram_aligns_under_source_columns() {
        // `a && b`: a at column 5, b at column 10, expression starts at 5.
        let action = falsy().with_keyword(Keyword::Then).with_expression("a && b");
        let meta = DiagnosticMeta::new("spec/math.rs", 12, 5)
            .with_sub(5, |ctx| ctx.get_or_nil("a"))
            .with_sub(10, |ctx| ctx.get_or_nil("b"));
        let ctx = Context::new();
        ctx.set("a", Value::Bool(false));
        ctx.set("b", Value::Bool(true));

        let msg = comprehensive_failure(&action, "Then a && b", &ctx, &meta).to_string();
        let expected = concat!(
            "Then a && b\n",
            "\n",
            "       Then expression failed at spec/math.rs:12:5\n",
            "\n",
            "       Then a && b\n",
            "              |    |\n",
            "              |    true\n",
            "              false\n",
            "\n",
        );
        assert_eq!(msg, expected);
    }

    #[test]
    fn short_value_shares_a_row_when_the_gap_is_wide_enough() {
        // value "1" (width 1) fits inline left of a gap of 6
        let action = falsy().with_keyword(Keyword::Then).with_expression("n < m");
        let meta = DiagnosticMeta::new("spec/order.rs", 3, 1)
            .with_sub(1, |ctx| ctx.get_or_nil("n"))
            .with_sub(7, |ctx| ctx.get_or_nil("m"));
        let ctx = Context::new();
        ctx.set("n", Value::from(1));
        ctx.set("m", Value::from(2));

        let msg = comprehensive_failure(&action, "Then n < m", &ctx, &meta).to_string();
        let expected = concat!(
            "Then n < m\n",
            "\n",
            "       Then expression failed at spec/order.rs:3:1\n",
            "\n",
            "       Then n < m\n",
            "           |     |\n",
            "           1     2\n",
            "\n",
        );
        assert_eq!(msg, expected);
    }

    #[test]
    fn binary_comparison_footer_aligns_relation_against_expected() {
        let action = falsy()
            .with_keyword(Keyword::Then)
            .with_expression("count === 3");
        let meta = DiagnosticMeta::new("spec/count.rs", 8, 1).with_comparison(
            CompareOp::StrictEq,
            |ctx| ctx.get_or_nil("count"),
            |_| Value::from(3),
        );
        let ctx = Context::new();
        ctx.set("count", Value::from(2));

        let msg = comprehensive_failure(&action, "Then count === 3", &ctx, &meta).to_string();
        assert!(msg.contains("                expected: 2\n"));
        assert!(msg.contains("       to strictly equal: 3\n"));
    }

    #[test]
    fn diagram_is_deterministic_for_identical_inputs() {
        let build = || {
            let action = falsy().with_keyword(Keyword::Then).with_expression("a && b");
            let meta = DiagnosticMeta::new("spec/math.rs", 12, 5)
                .with_sub(5, |ctx| ctx.get_or_nil("a"))
                .with_sub(10, |ctx| ctx.get_or_nil("b"));
            let ctx = Context::new();
            ctx.set("a", Value::Bool(false));
            ctx.set("b", Value::Bool(true));
            comprehensive_failure(&action, "Then a && b", &ctx, &meta).to_string()
        };
        assert_eq!(build(), build());
    }

    #[test]
    fn docify_falls_back_to_a_placeholder() {
        let action = falsy().with_keyword(Keyword::And);
        assert_eq!(docify(&action), "And <action>");
    }
}
