use crate::at::{AtError, AtVariant, BlockCipher, at};
use crate::constants::{MAX_K, MIN_K};
use crate::params::{collation_size, y_size_bits};
use crate::types::Metadata;
use rand_chacha::ChaCha8Rng;
use rand_core::{RngCore, SeedableRng};

fn random_metadata(rng: &mut ChaCha8Rng) -> Metadata {
    let mut bytes = [0; Metadata::SIZE];
    rng.fill_bytes(&mut bytes);
    Metadata::from_be_bytes(bytes)
}

#[test]
fn variant_boundaries() {
    assert_eq!(AtVariant::from_size(0), Some(AtVariant::SingleBlock));
    assert_eq!(AtVariant::from_size(128), Some(AtVariant::SingleBlock));
    assert_eq!(AtVariant::from_size(129), Some(AtVariant::TwoBlocks));
    assert_eq!(AtVariant::from_size(256), Some(AtVariant::TwoBlocks));
    assert_eq!(AtVariant::from_size(257), Some(AtVariant::ThreeBlocks));
    assert_eq!(AtVariant::from_size(384), Some(AtVariant::ThreeBlocks));
    assert_eq!(AtVariant::from_size(385), Some(AtVariant::FourBlocks));
    assert_eq!(AtVariant::from_size(512), Some(AtVariant::FourBlocks));
    assert_eq!(AtVariant::from_size(513), None);
}

#[test]
fn cipher_is_aes256() {
    // FIPS-197 appendix C.3
    let key = core::array::from_fn::<u8, 32, _>(|i| i as u8);
    let cipher = BlockCipher::new(&key);

    assert_eq!(
        cipher.encrypt(0x00112233445566778899aabbccddeeff),
        0x8ea2b7ca516745bfeafc49904b496089
    );
}

#[test]
fn output_width_and_determinism() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let cipher = BlockCipher::new(&[1; 32]);

    // Every variant is reached by some of these combinations
    for k in [MIN_K, 16, 25, 33, MAX_K] {
        for table_number in 2..=7 {
            let x = random_metadata(&mut rng);
            let y = random_metadata(&mut rng);

            let output = at(&cipher, k, table_number, x, y).unwrap();
            assert!(
                output.as_u64() < (1 << y_size_bits(k)),
                "k={k} table {table_number}"
            );
            assert_eq!(output, at(&cipher, k, table_number, x, y).unwrap());
        }
    }
}

#[test]
fn only_operand_bits_are_used() {
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let cipher = BlockCipher::new(&[2; 32]);
    let k = 20;

    for table_number in 2..=7 {
        let operand_bits = (usize::from(k) * collation_size(table_number).unwrap()) as u32;
        let x = random_metadata(&mut rng);
        let y = random_metadata(&mut rng);

        assert_eq!(
            at(&cipher, k, table_number, x, y).unwrap(),
            at(
                &cipher,
                k,
                table_number,
                x.truncate(operand_bits),
                y.truncate(operand_bits)
            )
            .unwrap(),
            "table {table_number}"
        );
    }
}

#[test]
fn inputs_and_key_affect_output() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let cipher = BlockCipher::new(&[3; 32]);
    let other_cipher = BlockCipher::new(&[4; 32]);
    let k = 32;

    for table_number in 2..=7 {
        let operand_bits = (usize::from(k) * collation_size(table_number).unwrap()) as u32;
        let x = random_metadata(&mut rng).truncate(operand_bits);
        let y = random_metadata(&mut rng).truncate(operand_bits);
        let output = at(&cipher, k, table_number, x, y).unwrap();

        // Flip the lowest and the highest bit of each operand, covering both halves of every
        // multi-block variant
        for bit in [0, operand_bits - 1] {
            let flip = Metadata::from(1_u64) << bit;
            assert_ne!(
                output,
                at(&cipher, k, table_number, x ^ flip, y).unwrap(),
                "table {table_number} x bit {bit}"
            );
            assert_ne!(
                output,
                at(&cipher, k, table_number, x, y ^ flip).unwrap(),
                "table {table_number} y bit {bit}"
            );
        }
        assert_ne!(
            output,
            at(&other_cipher, k, table_number, x, y).unwrap(),
            "table {table_number}"
        );
    }
}

#[test]
fn single_block_layout() {
    let cipher = BlockCipher::new(&[5; 32]);
    let k = 10;
    let x = Metadata::from(0x2ab_u64);
    let y = Metadata::from(0x155_u64);

    let shift = u128::BITS as usize - y_size_bits(k);

    let expected = cipher.encrypt((0x2ab << 10) | 0x155) >> shift;
    assert_eq!(at(&cipher, k, 2, x, y).unwrap().as_u64(), expected as u64);
}

#[test]
fn two_blocks_layout() {
    let cipher = BlockCipher::new(&[6; 32]);
    // Table 3 collates `2 * k` bits per operand, which is 160 bits combined
    let k = 40;
    let x = Metadata::from(0x12_3456_789a_bcde_f012_u128);
    let y = Metadata::from(0xfe_dcba_9876_5432_10fe_u128);

    let shift = u128::BITS as usize - y_size_bits(k);

    let encrypted_x = cipher.encrypt(0x12_3456_789a_bcde_f012);
    let expected = cipher.encrypt(encrypted_x ^ 0xfe_dcba_9876_5432_10fe) >> shift;
    assert_eq!(at(&cipher, k, 3, x, y).unwrap().as_u64(), expected as u64);
}

#[test]
fn three_blocks_layout() {
    let cipher = BlockCipher::new(&[7; 32]);
    // Table 4 collates `4 * k` bits per operand: 128 high bits and 32 low bits each
    let k = 40;
    let x_high = 0x0123_4567_89ab_cdef_fedc_ba98_7654_3210_u128;
    let x_low = 0xdead_beef_u128;
    let y_high = 0x0f1e_2d3c_4b5a_6978_8796_a5b4_c3d2_e1f0_u128;
    let y_low = 0x1357_9bdf_u128;
    let x = (Metadata::from(x_high) << 32) | Metadata::from(x_low);
    let y = (Metadata::from(y_high) << 32) | Metadata::from(y_low);

    let shift = u128::BITS as usize - y_size_bits(k);

    let encrypted_lows = cipher.encrypt((x_low << 32) | y_low);
    let expected = cipher
        .encrypt(encrypted_lows ^ cipher.encrypt(y_high) ^ cipher.encrypt(x_high))
        >> shift;
    assert_eq!(at(&cipher, k, 4, x, y).unwrap().as_u64(), expected as u64);
}

#[test]
fn four_blocks_layout() {
    let cipher = BlockCipher::new(&[8; 32]);
    // Table 4 collates `4 * k` bits per operand: 128 high bits and 72 low bits each
    let k = 50;
    let x_high = 0x8899_aabb_ccdd_eeff_0011_2233_4455_6677_u128;
    let x_low = 0xab_cdef_0123_4567_89ab_u128;
    let y_high = 0x7766_5544_3322_1100_ffee_ddcc_bbaa_9988_u128;
    let y_low = 0x54_3210_fedc_ba98_7654_u128;
    let x = (Metadata::from(x_high) << 72) | Metadata::from(x_low);
    let y = (Metadata::from(y_high) << 72) | Metadata::from(y_low);

    let shift = u128::BITS as usize - y_size_bits(k);

    let mixed_x = cipher.encrypt(cipher.encrypt(x_high) ^ x_low);
    let expected = cipher.encrypt(mixed_x ^ cipher.encrypt(y_high) ^ y_low) >> shift;
    assert_eq!(at(&cipher, k, 4, x, y).unwrap().as_u64(), expected as u64);
}

#[test]
fn unsupported_inputs() {
    let cipher = BlockCipher::new(&[0; 32]);

    assert_eq!(
        at(&cipher, 20, 1, Metadata::ZERO, Metadata::ZERO),
        Err(AtError::UnsupportedTable { table_number: 1 })
    );
    assert_eq!(
        at(&cipher, 20, 8, Metadata::ZERO, Metadata::ZERO),
        Err(AtError::UnsupportedTable { table_number: 8 })
    );
    assert_eq!(
        at(&cipher, 60, 2, Metadata::ZERO, Metadata::ZERO),
        Err(AtError::UnsupportedK { k: 60, y_bits: 65 })
    );
    assert_eq!(
        at(&cipher, 65, 4, Metadata::ZERO, Metadata::ZERO),
        Err(AtError::UnsupportedCollationSize {
            size: 520,
            k: 65,
            table_number: 4
        })
    );
    // Widest supported inputs
    assert!(at(&cipher, 59, 4, Metadata::mask(256), Metadata::mask(256)).is_ok());
}
