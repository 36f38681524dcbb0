//! Running-balance continuity check for bank statements.
//!
//! For rows listed oldest first, `previous balance + credit - debit` must
//! equal the row's balance. A model that reads the debit and credit columns
//! the wrong way round breaks that equation with the right amount but the
//! opposite sign, which is detectable and reversible without another model
//! call.

use crate::output::{Direction, TransactionRecord};
use crate::pipeline::schema::DateOrder;
use tracing::debug;

/// Flip the direction of every row whose amount only fits the balance
/// change with the opposite sign. Rows without a balance or an amount, and
/// rows that fit neither way, are left alone.
///
/// Returns the number of rows flipped.
pub fn reconcile_balances(records: &mut [TransactionRecord], order: DateOrder) -> usize {
    let order = order.resolve(records);
    let mut flipped = 0;

    for i in 1..records.len() {
        let (older, newer) = match order {
            DateOrder::Descending => (i, i - 1),
            _ => (i - 1, i),
        };
        let (Some(before), Some(after), Some(amount)) = (
            records[older].balance,
            records[newer].balance,
            records[newer].amount,
        ) else {
            continue;
        };

        let change = after - before;
        let signed = match records[newer].direction {
            Direction::Credit => amount,
            Direction::Debit => -amount,
        };
        if signed == change || signed != -change {
            continue;
        }

        let row = &mut records[newer];
        row.direction = match row.direction {
            Direction::Credit => Direction::Debit,
            Direction::Debit => Direction::Credit,
        };
        debug!(
            "Page {}: '{}' {} → {:?} (balance {} → {})",
            row.page, row.description, amount, row.direction, before, after
        );
        flipped += 1;
    }
    flipped
}
