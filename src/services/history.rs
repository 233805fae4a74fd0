use crate::records::{Institution, QuoteSnapshot};

/// Append `snapshot` to the institution's quote history, initialising it when absent.
pub fn merge_quote(mut institution: Institution, snapshot: QuoteSnapshot) -> Institution {
    match institution.quote_history.as_mut() {
        Some(history) => history.push(snapshot),
        None => institution.quote_history = Some(vec![snapshot]),
    }
    institution
}

/// Carry previously persisted history onto a freshly fetched catalog record.
pub fn carry_history(mut fresh: Institution, persisted: Option<&Institution>) -> Institution {
    if fresh.quote_history.is_none() {
        fresh.quote_history = persisted.and_then(|previous| previous.quote_history.clone());
    }
    fresh
}
