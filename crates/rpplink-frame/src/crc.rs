/// Initial register value.
pub const CRC16_INIT: u16 = 0xFFFF;

/// Reflected polynomial.
pub const CRC16_POLY: u16 = 0xA001;

/// Fold one byte into a running checksum.
pub fn crc16_update(crc: u16, byte: u8) -> u16 {
    let mut crc = crc ^ u16::from(byte);
    for _ in 0..8 {
        if (crc & 1) != 0 {
            crc = (crc >> 1) ^ CRC16_POLY;
        } else {
            crc >>= 1;
        }
    }
    crc
}

/// Frame checksum: poly 0xA001 (reflected), init 0xFFFF, no final XOR.
pub fn crc16(bytes: &[u8]) -> u16 {
    bytes.iter().fold(CRC16_INIT, |crc, &b| crc16_update(crc, b))
}
