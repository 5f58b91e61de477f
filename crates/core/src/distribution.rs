//! Distribution policies for distributed objects
//!
//! A distribution maps a (length, offset) byte range of a logical object
//! onto a sequence of per-server stripes. Three policies exist:
//!
//! - **round-robin**: consecutive blocks of `block_size` bytes rotate over
//!   all object servers, starting at `start_index`
//! - **single**: every byte lives on one configured server
//! - **weighted**: blocks rotate over a cycle in which each server appears
//!   as often as its weight; zero-weight servers are skipped entirely
//!
//! The emitted stripes always partition `[offset, offset + length)`: their
//! local lengths sum to `length` and their global offsets are contiguous.
//!
//! A distribution's policy and parameters can be serialized into a compact
//! self-describing record ([`DistributionMeta`]) so object metadata carries
//! enough to reconstruct it; the server count always comes from the live
//! configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default stripe size: 4 MiB.
pub const DEFAULT_BLOCK_SIZE: u64 = 4 * 1024 * 1024;

/// One stripe of a distributed byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stripe {
    /// Index of the server storing this stripe
    pub server: u32,
    /// Number of bytes in this stripe
    pub length: u64,
    /// Global offset of the stripe's first byte
    pub offset: u64,
    /// Sequential block number within the object's stripe schedule
    pub block: u64,
}

/// Serializable policy record stored in object metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DistributionMeta {
    /// Blocks rotate over all servers starting at `start_index`
    RoundRobin {
        /// Server the first block lands on
        start_index: u32,
        /// Stripe size in bytes
        block_size: u64,
    },
    /// All data on one server
    Single {
        /// The server index
        index: u32,
        /// Stripe size in bytes (kept for uniform metadata)
        block_size: u64,
    },
    /// Blocks rotate over a weighted cycle
    Weighted {
        /// Per-server weights; zero-weight servers never receive data
        weights: Vec<u32>,
        /// Stripe size in bytes
        block_size: u64,
    },
}

/// A distribution plus its current iteration state.
#[derive(Debug, Clone)]
pub struct Distribution {
    meta: DistributionMeta,
    server_count: u32,
    // iteration state, set by reset()
    length: u64,
    offset: u64,
}

impl Distribution {
    /// Round-robin distribution over `server_count` servers.
    ///
    /// # Errors
    ///
    /// Fails if `server_count` is zero or `block_size` is zero.
    pub fn round_robin(server_count: u32, start_index: u32, block_size: u64) -> Result<Self> {
        if server_count == 0 {
            return Err(Error::InvalidArgument("server count must be > 0".into()));
        }
        check_block_size(block_size)?;
        if start_index >= server_count {
            return Err(Error::InvalidArgument(format!(
                "start index {start_index} out of range for {server_count} servers"
            )));
        }
        Ok(Self {
            meta: DistributionMeta::RoundRobin {
                start_index,
                block_size,
            },
            server_count,
            length: 0,
            offset: 0,
        })
    }

    /// Single-server distribution.
    pub fn single(server_count: u32, index: u32, block_size: u64) -> Result<Self> {
        if index >= server_count {
            return Err(Error::InvalidArgument(format!(
                "server index {index} out of range for {server_count} servers"
            )));
        }
        check_block_size(block_size)?;
        Ok(Self {
            meta: DistributionMeta::Single { index, block_size },
            server_count,
            length: 0,
            offset: 0,
        })
    }

    /// Weighted distribution; `weights.len()` must equal `server_count` and
    /// at least one weight must be non-zero.
    pub fn weighted(server_count: u32, weights: Vec<u32>, block_size: u64) -> Result<Self> {
        if weights.len() != server_count as usize {
            return Err(Error::InvalidArgument(format!(
                "expected {server_count} weights, got {}",
                weights.len()
            )));
        }
        if weights.iter().all(|&w| w == 0) {
            return Err(Error::InvalidArgument(
                "at least one weight must be non-zero".into(),
            ));
        }
        check_block_size(block_size)?;
        Ok(Self {
            meta: DistributionMeta::Weighted {
                weights,
                block_size,
            },
            server_count,
            length: 0,
            offset: 0,
        })
    }

    /// Reconstruct a distribution from serialized metadata and the live
    /// server count.
    pub fn from_meta(meta: DistributionMeta, server_count: u32) -> Result<Self> {
        match meta {
            DistributionMeta::RoundRobin {
                start_index,
                block_size,
            } => Self::round_robin(server_count, start_index, block_size),
            DistributionMeta::Single { index, block_size } => {
                Self::single(server_count, index, block_size)
            }
            DistributionMeta::Weighted {
                weights,
                block_size,
            } => Self::weighted(server_count, weights, block_size),
        }
    }

    /// The serializable policy record.
    pub fn meta(&self) -> &DistributionMeta {
        &self.meta
    }

    /// Encode the policy record with MessagePack.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec(&self.meta)?)
    }

    /// Decode a policy record and bind it to the live server count.
    pub fn deserialize(bytes: &[u8], server_count: u32) -> Result<Self> {
        let meta: DistributionMeta = rmp_serde::from_slice(bytes)?;
        Self::from_meta(meta, server_count)
    }

    /// Number of servers this distribution spreads over.
    pub fn server_count(&self) -> u32 {
        self.server_count
    }

    /// The stripe size in bytes.
    pub fn block_size(&self) -> u64 {
        match self.meta {
            DistributionMeta::RoundRobin { block_size, .. }
            | DistributionMeta::Single { block_size, .. }
            | DistributionMeta::Weighted { block_size, .. } => block_size,
        }
    }

    /// Initialize an iteration over `[offset, offset + length)`.
    ///
    /// # Errors
    ///
    /// Fails if `offset + length` overflows.
    pub fn reset(&mut self, length: u64, offset: u64) -> Result<()> {
        offset.checked_add(length).ok_or_else(|| {
            Error::InvalidArgument("offset + length overflows u64".into())
        })?;
        self.length = length;
        self.offset = offset;
        Ok(())
    }

    /// Emit the next stripe, or `None` when the range is exhausted.
    pub fn next(&mut self) -> Option<Stripe> {
        if self.length == 0 {
            return None;
        }

        let stripe = match &self.meta {
            DistributionMeta::Single { index, .. } => Stripe {
                server: *index,
                length: self.length,
                offset: self.offset,
                block: 0,
            },
            DistributionMeta::RoundRobin {
                start_index,
                block_size,
            } => {
                let block = self.offset / block_size;
                let server = (u64::from(*start_index) + block) % u64::from(self.server_count);
                let interior = self.offset % block_size;
                let avail = (block_size - interior).min(self.length);
                Stripe {
                    server: server as u32,
                    length: avail,
                    offset: self.offset,
                    block,
                }
            }
            DistributionMeta::Weighted {
                weights,
                block_size,
            } => {
                let block = self.offset / block_size;
                let cycle: u64 = weights.iter().map(|&w| u64::from(w)).sum();
                let cycle_block = block % cycle;
                let server = server_for_cycle_block(weights, cycle_block);
                let interior = self.offset % block_size;
                let avail = (block_size - interior).min(self.length);
                Stripe {
                    server,
                    length: avail,
                    offset: self.offset,
                    block,
                }
            }
        };

        self.offset += stripe.length;
        self.length -= stripe.length;
        Some(stripe)
    }
}

/// Smallest server index whose cumulative weight exceeds `cycle_block`.
fn server_for_cycle_block(weights: &[u32], cycle_block: u64) -> u32 {
    let mut cumulative = 0u64;
    for (i, &w) in weights.iter().enumerate() {
        cumulative += u64::from(w);
        if cumulative > cycle_block {
            return i as u32;
        }
    }
    // unreachable: cycle_block < sum(weights) by construction
    (weights.len() - 1) as u32
}

fn check_block_size(block_size: u64) -> Result<()> {
    if block_size == 0 {
        Err(Error::InvalidArgument("block size must be >= 1".into()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn collect(d: &mut Distribution, length: u64, offset: u64) -> Vec<Stripe> {
        d.reset(length, offset).unwrap();
        let mut stripes = Vec::new();
        while let Some(s) = d.next() {
            stripes.push(s);
        }
        stripes
    }

    #[test]
    fn round_robin_exact_tuples() {
        // 3 servers, block size 4, range (length=10, offset=2)
        let mut d = Distribution::round_robin(3, 0, 4).unwrap();
        let stripes = collect(&mut d, 10, 2);
        assert_eq!(
            stripes,
            vec![
                Stripe { server: 0, length: 2, offset: 2, block: 0 },
                Stripe { server: 1, length: 4, offset: 4, block: 1 },
                Stripe { server: 2, length: 4, offset: 8, block: 2 },
            ]
        );
        assert_eq!(stripes.iter().map(|s| s.length).sum::<u64>(), 10);
    }

    #[test]
    fn round_robin_wraps_start_index() {
        let mut d = Distribution::round_robin(2, 1, 8).unwrap();
        let stripes = collect(&mut d, 24, 0);
        assert_eq!(stripes.len(), 3);
        assert_eq!(stripes[0].server, 1);
        assert_eq!(stripes[1].server, 0);
        assert_eq!(stripes[2].server, 1);
    }

    #[test]
    fn single_emits_one_stripe() {
        let mut d = Distribution::single(4, 2, DEFAULT_BLOCK_SIZE).unwrap();
        let stripes = collect(&mut d, 1 << 30, 512);
        assert_eq!(
            stripes,
            vec![Stripe { server: 2, length: 1 << 30, offset: 512, block: 0 }]
        );
    }

    #[test]
    fn empty_range_yields_nothing() {
        let mut d = Distribution::round_robin(3, 0, 4).unwrap();
        assert!(collect(&mut d, 0, 100).is_empty());
    }

    #[test]
    fn weighted_skips_zero_weight_servers() {
        // server 1 has weight 0 and must never appear
        let mut d = Distribution::weighted(3, vec![1, 0, 2], 4).unwrap();
        let stripes = collect(&mut d, 48, 0);
        assert!(stripes.iter().all(|s| s.server != 1));
        // cycle of 3 blocks: server 0 once, server 2 twice
        assert_eq!(stripes[0].server, 0);
        assert_eq!(stripes[1].server, 2);
        assert_eq!(stripes[2].server, 2);
        assert_eq!(stripes[3].server, 0);
    }

    #[test]
    fn weighted_rejects_all_zero() {
        assert!(Distribution::weighted(2, vec![0, 0], 4).is_err());
    }

    #[test]
    fn invalid_parameters() {
        assert!(Distribution::round_robin(0, 0, 4).is_err());
        assert!(Distribution::round_robin(3, 3, 4).is_err());
        assert!(Distribution::round_robin(3, 0, 0).is_err());
        assert!(Distribution::single(2, 5, 4).is_err());
        let mut d = Distribution::round_robin(3, 0, 4).unwrap();
        assert!(d.reset(2, u64::MAX - 1).is_err());
    }

    #[test]
    fn meta_round_trip() {
        let d = Distribution::weighted(3, vec![2, 1, 1], 4096).unwrap();
        let bytes = d.serialize().unwrap();
        let restored = Distribution::deserialize(&bytes, 3).unwrap();
        assert_eq!(restored.meta(), d.meta());
        assert_eq!(restored.block_size(), 4096);
    }

    proptest! {
        // Emitted stripes partition [offset, offset + length) for every policy.
        #[test]
        fn stripes_partition_range(
            servers in 1u32..8,
            start in 0u32..8,
            block_size in 1u64..1024,
            length in 1u64..100_000,
            offset in 0u64..100_000,
        ) {
            let start = start % servers;
            let mut d = Distribution::round_robin(servers, start, block_size).unwrap();
            d.reset(length, offset).unwrap();

            let mut expected_offset = offset;
            let mut total = 0u64;
            let mut index = 0u64;
            while let Some(s) = d.next() {
                prop_assert_eq!(s.offset, expected_offset);
                prop_assert!(s.length > 0);
                // invariant 4: server index follows the block arithmetic
                let block = s.offset / block_size;
                prop_assert_eq!(s.block, block);
                prop_assert_eq!(
                    u64::from(s.server),
                    (u64::from(start) + block) % u64::from(servers)
                );
                expected_offset += s.length;
                total += s.length;
                index += 1;
                prop_assert!(index <= length); // termination guard
            }
            prop_assert_eq!(total, length);
            prop_assert_eq!(expected_offset, offset + length);
        }

        #[test]
        fn weighted_partition(
            weights in proptest::collection::vec(0u32..4, 1..6),
            length in 1u64..50_000,
            offset in 0u64..50_000,
        ) {
            prop_assume!(weights.iter().any(|&w| w > 0));
            let servers = weights.len() as u32;
            let mut d = Distribution::weighted(servers, weights.clone(), 512).unwrap();
            d.reset(length, offset).unwrap();

            let mut total = 0u64;
            let mut expected_offset = offset;
            while let Some(s) = d.next() {
                prop_assert_eq!(s.offset, expected_offset);
                prop_assert!(weights[s.server as usize] > 0);
                expected_offset += s.length;
                total += s.length;
            }
            prop_assert_eq!(total, length);
        }
    }
}
