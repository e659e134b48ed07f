/// Linear PCM buffer helpers.
use crate::models::config::AudioConfig;
use crate::models::error::RecorderError;

/// Number of sample blocks in a raw buffer of `length` bytes.
///
/// Rejects empty buffers, a zero block size, and lengths that are not a whole
/// number of blocks, before any division happens.
pub fn sample_count(config: &AudioConfig, length: usize) -> Result<usize, RecorderError> {
    let block = config.block_size();
    if block == 0 {
        return Err(RecorderError::InvalidAudioBuffer("sample block size is zero".into()));
    }
    if length == 0 {
        return Err(RecorderError::InvalidAudioBuffer("buffer is empty".into()));
    }
    if length % block != 0 {
        return Err(RecorderError::InvalidAudioBuffer(format!(
            "{} bytes is not a multiple of the {}-byte sample block",
            length, block
        )));
    }
    Ok(length / block)
}

/// Strip per-block padding so only `channels * bytes_per_sample` bytes per
/// block remain. Returns the input unchanged when blocks carry no padding.
pub fn pack_blocks(config: &AudioConfig, data: &[u8]) -> Vec<u8> {
    let block = config.block_size();
    let payload = config.channels as usize * config.sample_format.bytes_per_sample();
    if block == payload || block == 0 {
        return data.to_vec();
    }
    data.chunks_exact(block)
        .flat_map(|chunk| chunk[..payload].iter().copied())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::formats::SampleFormat;

    #[test]
    fn stereo_s16_sample_count() {
        let config = AudioConfig::default();
        assert_eq!(sample_count(&config, 4 * 480).unwrap(), 480);
    }

    #[test]
    fn partial_block_is_rejected() {
        let config = AudioConfig::default();
        let err = sample_count(&config, 6).unwrap_err();
        assert!(matches!(err, RecorderError::InvalidAudioBuffer(_)));
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let config = AudioConfig::default();
        assert!(sample_count(&config, 0).is_err());
    }

    #[test]
    fn padded_blocks_are_packed() {
        // 3 channels of u8 padded to 4-byte blocks
        let config = AudioConfig {
            channels: 3,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: SampleFormat::U8,
            block_align: 4,
        };
        let data = [1, 2, 3, 0, 4, 5, 6, 0];
        assert_eq!(sample_count(&config, data.len()).unwrap(), 2);
        assert_eq!(pack_blocks(&config, &data), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn unpadded_blocks_pass_through() {
        let config = AudioConfig::default();
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(pack_blocks(&config, &data), data.to_vec());
    }
}
