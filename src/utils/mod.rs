use rand::distributions::uniform::SampleUniform;
use rand::distributions::{Distribution, Uniform};

use std::convert::TryInto;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::path::Path;
use std::time::Duration;

/// Generate `len` uniform random values in `[min, max)`.
pub fn rand_vec<T: SampleUniform>(len: usize, min: T, max: T) -> Vec<T> {
    let range = Uniform::new(min, max);
    let mut rng = rand::thread_rng();
    (0..len).map(|_| range.sample(&mut rng)).collect()
}

pub fn load_file(file: &Path) -> Option<Vec<u8>> {
    match std::fs::read(file) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            eprintln!("[ERR] Impossible to read file {} : {}", file.display(), err);
            None
        }
    }
}

/// Reinterpret SPIR-V bytes as the 32-bit words Vulkan expects.
pub fn to_vec32(vecin: Vec<u8>) -> Vec<u32> {
    vecin
        .chunks_exact(4)
        .map(|word| u32::from_ne_bytes(word.try_into().unwrap()))
        .collect()
}

pub fn cstr2string(cstr: &[c_char]) -> String {
    unsafe { CStr::from_ptr(cstr.as_ptr()) }
        .to_string_lossy()
        .into_owned()
}

/// Whole milliseconds of a duration, for the timing printout.
pub fn get_fract_s(duration: Duration) -> String {
    format!("{}", duration.as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rand_vec_respects_bounds() {
        let values = rand_vec::<f32>(1024, 0.0, 1.0);
        assert_eq!(values.len(), 1024);
        assert!(values.iter().all(|v| *v >= 0.0 && *v < 1.0));
    }

    #[test]
    fn rand_vec_varies_between_calls() {
        let first = rand_vec::<f32>(64, 0.0, 1.0);
        let second = rand_vec::<f32>(64, 0.0, 1.0);
        assert_ne!(first, second);
    }

    #[test]
    fn to_vec32_packs_bytes_into_words() {
        let words = to_vec32(vec![0x03, 0x02, 0x23, 0x07, 0x00, 0x00, 0x01, 0x00]);
        assert_eq!(words.len(), 2);
        assert_eq!(words[0], u32::from_ne_bytes([0x03, 0x02, 0x23, 0x07]));
        assert_eq!(words[1], u32::from_ne_bytes([0x00, 0x00, 0x01, 0x00]));
    }

    #[test]
    fn to_vec32_drops_trailing_partial_word() {
        assert_eq!(to_vec32(vec![1, 2, 3, 4, 5]).len(), 1);
    }

    #[test]
    fn get_fract_s_reports_milliseconds() {
        assert_eq!(get_fract_s(Duration::from_millis(1204)), "1204");
        assert_eq!(get_fract_s(Duration::from_micros(999)), "0");
    }
}
