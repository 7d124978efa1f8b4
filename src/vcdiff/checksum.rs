// Adler-32 over a window's target bytes (VCD_CHECKSUM).

/// Adler-32 of `data`.
pub fn adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        // Largest n such that 255n(n+1)/2 + (n+1)(MOD_ADLER-1) fits in u32.
        const NMAX: usize = 5552;
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for chunk in data.chunks(NMAX) {
            for &byte in chunk {
                a += u32::from(byte);
                b += a;
            }
            a %= MOD_ADLER;
            b %= MOD_ADLER;
        }
        (b << 16) | a
    }
}
