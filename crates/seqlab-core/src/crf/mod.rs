pub mod model;
pub mod viterbi;

pub use model::CrfLabeler;
pub use viterbi::{ViterbiDecoder, ViterbiPath};

use crate::vocab::RESERVED_IDS;

/// Map a vocabulary id into CRF label space.
///
/// Reserved and padding ids clip to label 0; sequence lengths keep them
/// out of the likelihood.
pub fn to_crf_label(id: u32) -> u32 {
    id.saturating_sub(RESERVED_IDS)
}

/// Map a CRF label back to its vocabulary id.
pub fn from_crf_label(tag: usize) -> u32 {
    tag as u32 + RESERVED_IDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_round_trips_for_real_labels() {
        for id in RESERVED_IDS..64 {
            assert_eq!(from_crf_label(to_crf_label(id) as usize), id);
        }
    }

    #[test]
    fn reserved_ids_clip_to_zero() {
        for id in 0..RESERVED_IDS {
            assert_eq!(to_crf_label(id), 0);
        }
    }
}
