#[cfg(test)]
mod tests {
    use afe_globals::Error;
    use afe_mpsse::{DacCode, encode_unipolar};

    #[test]
    fn register_pair_packing() {
        let code = DacCode::new(0x599).unwrap();
        assert_eq!(code.to_bytes(), [0x99, 0x05]);
        assert_eq!(DacCode::from_bytes([0x99, 0xF5]), code);
        assert_eq!(DacCode::new(0x1000), Err(Error::CodeOverflow(0x1000)));
    }

    #[test]
    fn burst_of_three_gates() {
        let code = DacCode::new(0x599).unwrap();
        let bytes = DacCode::pack(&[code; 3]);
        assert_eq!(bytes, vec![0x99, 0x05, 0x99, 0x05, 0x99, 0x05]);
        assert_eq!(DacCode::unpack(&bytes).unwrap(), vec![code; 3]);
        assert!(DacCode::unpack(&bytes[..5]).is_err());
    }

    #[test]
    fn unipolar_encoding() {
        assert_eq!(encode_unipolar(0.0), Ok([0x00, 0x00]));
        // floor(2.5 * 4095 / 5) = 0x7FF, one LSB below midscale
        assert_eq!(encode_unipolar(2.5), Ok([0x7F, 0xF0]));
        assert_eq!(encode_unipolar(5.0), Ok([0xFF, 0xF0]));
        assert!(encode_unipolar(-0.1).is_err());
        assert!(encode_unipolar(5.1).is_err());
    }
}
