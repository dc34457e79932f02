//! List surgery on a draft's ingredient lines.
//!
//! Out-of-range edits are not errors: functions that can be no-ops return
//! `None` so the caller can keep its current snapshot.

use shared::domain::IngredientRef;

/// Inserts a blank line right after `index`; appends when `index` is absent
/// or out of range.
pub fn insert_after(lines: &[IngredientRef], index: Option<isize>) -> Vec<IngredientRef> {
    let mut out = lines.to_vec();
    match index.and_then(|i| usize::try_from(i).ok()) {
        Some(i) if i < out.len() => out.insert(i + 1, IngredientRef::blank()),
        _ => out.push(IngredientRef::blank()),
    }
    out
}

pub fn delete_at(lines: &[IngredientRef], index: Option<isize>) -> Option<Vec<IngredientRef>> {
    let i = usize::try_from(index?).ok()?;
    if i >= lines.len() {
        return None;
    }
    let mut out = lines.to_vec();
    out.remove(i);
    Some(out)
}

/// Splits `text` into trimmed, non-blank lines inserted after `index`
/// (clamped into range). A blank line at `index` is replaced by the paste,
/// and removed even when the paste itself holds nothing.
pub fn paste_at(lines: &[IngredientRef], index: isize, text: &str) -> Option<Vec<IngredientRef>> {
    let pasted: Vec<IngredientRef> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(IngredientRef::raw)
        .collect();
    if lines.is_empty() {
        return (!pasted.is_empty()).then_some(pasted);
    }

    let mut out = lines.to_vec();
    let idx = usize::try_from(index).unwrap_or(0).min(out.len() - 1);
    let at = if out[idx].is_blank() {
        out.remove(idx);
        idx
    } else if pasted.is_empty() {
        return None;
    } else {
        idx + 1
    };
    out.splice(at..at, pasted);
    Some(out)
}
