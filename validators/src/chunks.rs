/// Partition the ordered pubkey list into request-sized batches.
///
/// Order is preserved and the final chunk may be shorter; an empty
/// input yields no chunks. `batch_size` is validated to be non-zero at
/// config time.
pub fn plan_chunks(keys: &[String], batch_size: usize) -> Vec<Vec<String>> {
    keys.chunks(batch_size).map(|chunk| chunk.to_vec()).collect()
}
