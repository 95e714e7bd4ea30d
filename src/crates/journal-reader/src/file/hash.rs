use crate::file::object::{HeaderIncompatibleFlags, JournalHeader};
use siphasher::sip::SipHasher24;
use std::hash::Hasher;

pub fn jenkins_hash64(data: &[u8]) -> u64 {
    use hashers::jenkins::Lookup3Hasher;

    let mut hasher = Lookup3Hasher::default();
    hasher.write(data);
    let hash = hasher.finish();

    // Jenkins lookup3 returns two 32-bit values (pc, pb)
    // systemd expects: first 32-bit as high part, second 32-bit as low part
    // But Lookup3Hasher::finish() returns them in opposite order, so swap them
    let low = (hash & 0xFFFFFFFF) as u32;
    let high = (hash >> 32) as u32;
    ((low as u64) << 32) | (high as u64)
}

pub fn siphash24(data: &[u8], key: &[u8; 16]) -> u64 {
    let mut k0 = [0u8; 8];
    let mut k1 = [0u8; 8];
    k0.copy_from_slice(&key[..8]);
    k1.copy_from_slice(&key[8..]);

    let mut hasher = SipHasher24::new_with_keys(u64::from_le_bytes(k0), u64::from_le_bytes(k1));
    hasher.write(data);
    hasher.finish()
}

/// The hash function a journal file uses for data and field payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadHasher {
    /// Jenkins lookup3, used by files without the keyed-hash flag.
    Jenkins,
    /// SipHash-2-4 keyed with the file id.
    Keyed([u8; 16]),
}

impl PayloadHasher {
    pub fn for_header(header: &JournalHeader) -> Self {
        if header.has_incompatible_flag(HeaderIncompatibleFlags::KeyedHash) {
            PayloadHasher::Keyed(header.file_id)
        } else {
            PayloadHasher::Jenkins
        }
    }

    pub fn hash(&self, data: &[u8]) -> u64 {
        match self {
            PayloadHasher::Jenkins => jenkins_hash64(data),
            PayloadHasher::Keyed(file_id) => siphash24(data, file_id),
        }
    }
}
