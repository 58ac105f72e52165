//! AUX transactions with bounded immediate retries.

use helix_dp_core::{AuxChannel, Result};

/// Read, retrying up to `retries` times on failure
pub(crate) fn read<A: AuxChannel + ?Sized>(
    aux: &mut A,
    address: u32,
    buf: &mut [u8],
    retries: u32,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match aux.read(address, buf) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < retries => {
                attempt += 1;
                log::warn!(
                    "DP: AUX read {:#05x} failed ({}), retry {}/{}",
                    address,
                    e,
                    attempt,
                    retries
                );
            },
            Err(e) => return Err(e.into()),
        }
    }
}

/// Write, retrying up to `retries` times on failure
pub(crate) fn write<A: AuxChannel + ?Sized>(
    aux: &mut A,
    address: u32,
    data: &[u8],
    retries: u32,
) -> Result<()> {
    let mut attempt = 0;
    loop {
        match aux.write(address, data) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < retries => {
                attempt += 1;
                log::warn!(
                    "DP: AUX write {:#05x} failed ({}), retry {}/{}",
                    address,
                    e,
                    attempt,
                    retries
                );
            },
            Err(e) => return Err(e.into()),
        }
    }
}
