//! The concurrency-control manager oracle: an external collaborator the
//! operators consult before touching a table, and unwind from on denial.

/// The kind of access an operator is about to perform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
}

impl std::fmt::Display for Access {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Access::Read => "READ",
            Access::Write => "WRITE",
        })
    }
}

/// The interface the executor needs from the concurrency-control
/// manager: transaction lifecycle plus per-access authorization.
pub trait Ccm {
    fn begin_transaction(&mut self) -> u64;
    fn end_transaction(&mut self, tx_id: u64);
    fn validate_object(&mut self, table: &str, tx_id: u64, access: Access) -> bool;
    fn active_transactions(&self) -> Vec<u64>;
}

/// A `Ccm` that authorizes everything and hands out sequential
/// transaction ids; used in tests and as a baseline single-user
/// implementation when no richer concurrency control is wired in.
#[derive(Default)]
pub struct AllowAllCcm {
    next_tx_id: u64,
    active: Vec<u64>,
}

impl Ccm for AllowAllCcm {
    fn begin_transaction(&mut self) -> u64 {
        self.next_tx_id += 1;
        self.active.push(self.next_tx_id);
        self.next_tx_id
    }

    fn end_transaction(&mut self, tx_id: u64) {
        self.active.retain(|&t| t != tx_id);
    }

    fn validate_object(&mut self, _table: &str, _tx_id: u64, _access: Access) -> bool {
        true
    }

    fn active_transactions(&self) -> Vec<u64> {
        self.active.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_all_ccm_issues_sequential_ids_and_tracks_active_set() {
        let mut ccm = AllowAllCcm::default();
        let t1 = ccm.begin_transaction();
        let t2 = ccm.begin_transaction();
        assert_ne!(t1, t2);
        assert_eq!(ccm.active_transactions().len(), 2);
        ccm.end_transaction(t1);
        assert_eq!(ccm.active_transactions(), vec![t2]);
        assert!(ccm.validate_object("t", t2, Access::Write));
    }
}
