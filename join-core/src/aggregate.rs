//! Sums every worker's [`JoinStats`] into the two numbers the rest of
//! the program reports: total matches and a checksum.

use crate::colbp::JoinStats;

pub fn aggregate(per_worker: &[JoinStats]) -> JoinStats {
    per_worker.iter().fold(JoinStats::default(), |acc, s| JoinStats {
        matches: acc.matches + s.matches,
        checksum: acc.checksum + s.checksum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_sums_all_workers() {
        let stats = vec![
            JoinStats { matches: 10, checksum: 100 },
            JoinStats { matches: 20, checksum: 200 },
            JoinStats { matches: 5, checksum: 50 },
        ];
        let total = aggregate(&stats);
        assert_eq!(total.matches, 35);
        assert_eq!(total.checksum, 350);
    }

    #[test]
    fn aggregate_of_empty_is_zero() {
        let total = aggregate(&[]);
        assert_eq!(total, JoinStats::default());
    }
}
