use crate::{
    file::io::{push_le, read_le},
    metadata::{method::MethodBodyFlags, token::Token},
    Error::OutOfBounds,
    Result,
};

/// Largest code size a tiny header can describe.
const TINY_MAX_CODE_SIZE: usize = 0x3F;
/// Largest evaluation stack a tiny header implies.
const TINY_MAX_STACK: u16 = 8;

/// A method body header (ECMA-335 II.25.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Size of the CIL code in bytes
    pub size_code: usize,
    /// Size of the header in bytes, 1 for tiny and usually 12 for fat bodies
    pub size_header: usize,
    /// `StandAloneSig` token of the locals signature, null if there are no locals
    pub local_var_sig_token: Token,
    /// Maximum evaluation stack depth
    pub max_stack: u16,
    /// `true` for fat headers
    pub is_fat: bool,
    /// `true` if locals are zero-initialized
    pub is_init_local: bool,
    /// `true` if extra data sections (exception handling tables) follow the code
    pub has_sections: bool,
}

impl MethodBody {
    /// Parses the header of the body starting at `data[0]`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header or the code extends past `data`
    /// and [`crate::Error::Malformed`] for an unknown header format.
    pub fn from(data: &[u8]) -> Result<MethodBody> {
        let Some(first_byte) = data.first().copied() else {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        };

        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_0000_0011)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(OutOfBounds);
                }

                Ok(MethodBody {
                    size_code,
                    size_header: 1,
                    local_var_sig_token: Token::default(),
                    max_stack: TINY_MAX_STACK,
                    is_fat: false,
                    is_init_local: false,
                    has_sections: false,
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < 12 {
                    return Err(OutOfBounds);
                }

                let first_duo = read_le::<u16>(data)?;
                let size_header = ((first_duo >> 12) * 4) as usize;
                if size_header < 12 {
                    return Err(malformed_error!("Fat header size too small - {}", size_header));
                }

                let size_code = read_le::<u32>(&data[4..])? as usize;
                if data.len() < size_code + size_header {
                    return Err(OutOfBounds);
                }

                let flags = MethodBodyFlags::from_bits_truncate(first_duo & 0x0FFF);
                Ok(MethodBody {
                    size_code,
                    size_header,
                    local_var_sig_token: Token::new(read_le::<u32>(&data[8..])?),
                    max_stack: read_le::<u16>(&data[2..])?,
                    is_fat: true,
                    is_init_local: flags.contains(MethodBodyFlags::INIT_LOCALS),
                    has_sections: flags.contains(MethodBodyFlags::MORE_SECTS),
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    /// The code bytes of the body whose header was parsed from `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than the body.
    pub fn code<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        data.get(self.size_header..self.size_header + self.size_code)
            .ok_or(OutOfBounds)
    }

    /// Encodes a complete body without data sections.
    ///
    /// A tiny header is used when the code is short, the stack shallow and no locals are
    /// declared; everything else gets a fat header. Callers that place fat bodies must keep
    /// them 4-byte aligned.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the code exceeds 4 GiB.
    pub fn encode(
        code: &[u8],
        max_stack: u16,
        local_var_sig_token: Token,
        init_locals: bool,
    ) -> Result<Vec<u8>> {
        let size_code = u32::try_from(code.len()).map_err(|_| OutOfBounds)?;

        let mut out = Vec::with_capacity(code.len() + 12);
        if code.len() <= TINY_MAX_CODE_SIZE
            && max_stack <= TINY_MAX_STACK
            && local_var_sig_token.is_null()
        {
            out.push(((code.len() as u8) << 2) | MethodBodyFlags::TINY_FORMAT.bits() as u8);
        } else {
            let mut flags = MethodBodyFlags::FAT_FORMAT;
            if init_locals && !local_var_sig_token.is_null() {
                flags |= MethodBodyFlags::INIT_LOCALS;
            }
            // header size in dwords lives in the upper four bits
            push_le(&mut out, flags.bits() | (3 << 12));
            push_le(&mut out, max_stack);
            push_le(&mut out, size_code);
            push_le(&mut out, local_var_sig_token.value());
        }
        out.extend_from_slice(code);
        Ok(out)
    }

    /// `true` if a body encoded by [`MethodBody::encode`] with these parameters needs a fat
    /// header.
    #[must_use]
    pub fn needs_fat_header(code_len: usize, max_stack: u16, local_var_sig_token: Token) -> bool {
        code_len > TINY_MAX_CODE_SIZE
            || max_stack > TINY_MAX_STACK
            || !local_var_sig_token.is_null()
    }
}
