//! Path checksum used by the bank-mapping format.

/// Compute the 32-bit checksum of a file path.
///
/// The bank map identifies files by this hash rather than by name: it is
/// used both to look up existing entries and to generate new ones. The path
/// is lowercased and backslashes are normalized to forward slashes before
/// hashing, matching the hash table the game ships with; the hash itself is
/// CRC-32.
///
/// Pure function with no state; safe to call from any thread.
pub fn compute_checksum(path: &str) -> u32 {
    let normalized: String = path
        .chars()
        .map(|c| match c {
            '\\' => '/',
            c => c.to_ascii_lowercase(),
        })
        .collect();
    crc32fast::hash(normalized.as_bytes())
}
