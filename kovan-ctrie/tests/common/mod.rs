//! Hashers that force key collisions, for driving the trie into deep
//! branches and collision buckets.

#![allow(dead_code)]

use std::hash::{BuildHasher, Hasher};

/// Maps every key onto one of `buckets` full 32-bit hashes.
#[derive(Clone, Copy)]
pub struct Colliding {
    pub buckets: u64,
}

impl Colliding {
    pub fn new(buckets: u64) -> Self {
        Self { buckets }
    }
}

pub struct CollidingHasher {
    acc: u64,
    buckets: u64,
}

impl Hasher for CollidingHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.acc = self.acc.wrapping_mul(257).wrapping_add(b as u64);
        }
    }

    fn finish(&self) -> u64 {
        self.acc % self.buckets
    }
}

impl BuildHasher for Colliding {
    type Hasher = CollidingHasher;

    fn build_hasher(&self) -> Self::Hasher {
        CollidingHasher {
            acc: 0,
            buckets: self.buckets,
        }
    }
}

/// Uses a `u32` key as its own hash.
#[derive(Clone, Copy, Default)]
pub struct Identity;

#[derive(Default)]
pub struct IdentityHasher(u64);

impl Hasher for IdentityHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | b as u64;
        }
    }

    fn write_u32(&mut self, n: u32) {
        self.0 = n as u64;
    }

    fn finish(&self) -> u64 {
        self.0
    }
}

impl BuildHasher for Identity {
    type Hasher = IdentityHasher;

    fn build_hasher(&self) -> Self::Hasher {
        IdentityHasher::default()
    }
}
