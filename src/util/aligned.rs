//! Byte storage aligned for any scalar or vector element type.

use bytemuck::Pod;

// 16 bytes covers every OpenCL built-in up to float4/long2.
type Word = u128;
const WORD: usize = std::mem::size_of::<Word>();

/// Heap byte buffer whose start is aligned to 16 bytes, so it can be viewed
/// as a slice of any [`Pod`] type whose size divides its length.
#[derive(Clone, Default)]
pub struct AlignedBytes {
    words: Vec<Word>,
    len: usize,
}

impl AlignedBytes {
    /// Zero-filled storage of `len` bytes.
    pub fn zeroed(len: usize) -> Self {
        Self {
            words: vec![0; (len + WORD - 1) / WORD],
            len,
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut storage = Self::zeroed(bytes.len());
        storage.as_bytes_mut().copy_from_slice(bytes);
        storage
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<Word, u8>(&self.words)[..self.len]
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        let len = self.len;
        &mut bytemuck::cast_slice_mut::<Word, u8>(&mut self.words)[..len]
    }

    /// Typed view; `None` when the length is not a multiple of `T`.
    pub fn as_slice<T: Pod>(&self) -> Option<&[T]> {
        bytemuck::try_cast_slice(self.as_bytes()).ok()
    }

    pub fn as_slice_mut<T: Pod>(&mut self) -> Option<&mut [T]> {
        bytemuck::try_cast_slice_mut(self.as_bytes_mut()).ok()
    }
}

impl std::fmt::Debug for AlignedBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBytes").field("len", &self.len).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_view() {
        let data: Vec<f32> = (0..9).map(|i| i as f32).collect();
        let storage = AlignedBytes::from_bytes(bytemuck::cast_slice(&data));
        assert_eq!(storage.len(), 36);
        assert_eq!(storage.as_slice::<f32>().unwrap(), &data[..]);
    }

    #[test]
    fn test_length_mismatch() {
        let storage = AlignedBytes::zeroed(6);
        assert!(storage.as_slice::<u32>().is_none());
        assert_eq!(storage.as_slice::<u16>().unwrap().len(), 3);
    }

    #[test]
    fn test_mutation() {
        let mut storage = AlignedBytes::zeroed(8);
        storage.as_slice_mut::<u32>().unwrap()[1] = 7;
        assert_eq!(storage.as_bytes()[4], 7);
    }
}
