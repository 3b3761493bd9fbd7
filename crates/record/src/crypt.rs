/// Contract for a streaming cipher stage used by encrypted XML scopes.
///
/// The writer feeds plaintext markup through `update` while the scope is
/// open and flushes trailing block state with `finalize` when it closes;
/// the reader runs the same interface in the decrypting direction.
/// Concrete ciphers live outside the core.
pub trait CryptBuf {
    /// Algorithm identifier without its namespace, e.g. "aes-256-cbc".
    fn algorithm(&self) -> &str;

    /// Key name advertised in the KeyInfo envelope.
    fn key_name(&self) -> String {
        String::new()
    }

    /// Transform a chunk, appending output bytes to `out`.
    fn update(&mut self, src: &[u8], out: &mut Vec<u8>);

    /// Flush trailing state, appending output bytes to `out`.
    fn finalize(&mut self, out: &mut Vec<u8>);
}
