//! Alignment of model cases onto entries
//!
//! Passes run in order (exact id, id suffix, title, position); each pass
//! only sees entries and cases left unmatched by the earlier ones, so the
//! mapping stays 1:1 under reordering or omission.

use crate::stage1::Stage1Entry;
use crate::testcase::RawCase;

fn exact(ticket: &str, entry: &Stage1Entry, case: &RawCase) -> bool {
    case.id
        .as_deref()
        .map(str::trim)
        .is_some_and(|id| id == entry.id || id == format!("{ticket}.{}", entry.id))
}

fn suffix(_: &str, entry: &Stage1Entry, case: &RawCase) -> bool {
    case.id.as_deref().map(str::trim).is_some_and(|id| {
        id.ends_with(&format!(".{}", entry.id))
            || id.ends_with(&format!("-{}", entry.id))
            || (id.contains('.') && entry.id.ends_with(&format!(".{id}")))
    })
}

fn title(_: &str, entry: &Stage1Entry, case: &RawCase) -> bool {
    case.title
        .as_deref()
        .is_some_and(|t| t.trim().eq_ignore_ascii_case(entry.title.trim()))
}

fn position(_: &str, _: &Stage1Entry, _: &RawCase) -> bool {
    true
}

type Matcher = fn(&str, &Stage1Entry, &RawCase) -> bool;

const PASSES: [Matcher; 4] = [exact, suffix, title, position];

/// One slot per entry, holding the case aligned to it
#[must_use]
pub fn align(entries: &[&Stage1Entry], cases: Vec<RawCase>, ticket: &str) -> Vec<Option<RawCase>> {
    let mut slots: Vec<Option<usize>> = vec![None; entries.len()];
    let mut used = vec![false; cases.len()];

    for matcher in PASSES {
        for (slot, entry) in slots.iter_mut().zip(entries) {
            if slot.is_some() {
                continue;
            }
            let found = cases
                .iter()
                .enumerate()
                .find(|(i, case)| !used[*i] && matcher(ticket, entry, case))
                .map(|(i, _)| i);
            if let Some(i) = found {
                used[i] = true;
                *slot = Some(i);
            }
        }
    }

    let mut cases: Vec<Option<RawCase>> = cases.into_iter().map(Some).collect();
    slots
        .into_iter()
        .map(|slot| slot.and_then(|i| cases[i].take()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::entry;
    use pretty_assertions::assert_eq;

    fn raw(id: Option<&str>, title: &str) -> RawCase {
        RawCase {
            id: id.map(str::to_string),
            title: Some(title.to_string()),
            ..RawCase::default()
        }
    }

    fn titles(slots: &[Option<RawCase>]) -> Vec<Option<&str>> {
        slots.iter().map(|s| s.as_ref().and_then(|c| c.title.as_deref())).collect()
    }

    #[test]
    fn passes_apply_in_order() {
        let e = [
            entry("010.010", "Valid OTP", &[], &[]),
            entry("010.020", "Expired OTP", &[], &[]),
            entry("010.030", "Wrong OTP", &[], &[]),
            entry("010.040", "Locked account", &[], &[]),
        ];
        let refs: Vec<&Stage1Entry> = e.iter().collect();
        let cases = vec![
            raw(None, "leftover"),
            raw(Some("x"), "wrong otp"),
            raw(Some("TC-010.020"), "b"),
            raw(Some("TCG-1.010.010"), "a"),
        ];
        let slots = align(&refs, cases, "TCG-1");
        assert_eq!(titles(&slots), vec![Some("a"), Some("b"), Some("wrong otp"), Some("leftover")]);
    }

    #[test]
    fn omitted_cases_leave_empty_slots() {
        let e = [entry("010.010", "A", &[], &[]), entry("010.020", "B", &[], &[])];
        let refs: Vec<&Stage1Entry> = e.iter().collect();
        let slots = align(&refs, vec![raw(Some("010.020"), "b")], "TCG-1");
        assert_eq!(titles(&slots), vec![None, Some("b")]);
    }
}
