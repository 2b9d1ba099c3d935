mod stats;

pub use stats::Stats;

/// Indices of the set bits of a lane mask, lowest first.
pub fn set_bits(mask: u64) -> SetBits {
    SetBits { remaining: mask }
}

#[derive(Copy, Clone, Debug)]
pub struct SetBits {
    remaining: u64,
}

impl Iterator for SetBits {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        (self.remaining != 0).then(|| {
            let index = self.remaining.trailing_zeros() as usize;
            self.remaining &= self.remaining - 1;
            index
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.remaining.count_ones() as usize;
        (len, Some(len))
    }
}

impl ExactSizeIterator for SetBits {}
