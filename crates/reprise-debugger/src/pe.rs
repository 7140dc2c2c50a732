use scroll::{Pread, LE};

/// Bytes of a mapped image that are guaranteed to cover its headers.
pub(crate) const HEADER_PREFIX_LEN: usize = 4096;

const PE_SIGNATURE: u32 = 0x0000_4550;
const MAGIC_PE32: u16 = 0x10b;
const MAGIC_PE32_PLUS: u16 = 0x20b;

/// Locates the optional header inside the image headers.
///
/// On success, returns its file offset and magic value.
fn optional_header(image: &[u8]) -> crate::Result<(usize, u16)> {
    let pe_offset: u32 = image.pread_with(0x3c, LE)?;

    let signature: u32 = image.pread_with(pe_offset as usize, LE)?;
    if signature != PE_SIGNATURE {
        return Err(crate::Error::BadPe("signature mismatch"));
    }

    let opt_offset = pe_offset as usize + 0x18;
    let magic: u16 = image.pread_with(opt_offset, LE)?;
    if magic != MAGIC_PE32 && magic != MAGIC_PE32_PLUS {
        return Err(crate::Error::BadPe("unknown optional header magic"));
    }

    Ok((opt_offset, magic))
}

/// Extracts the entrypoint RVA from the image headers.
///
/// Returns `None` for images without an entrypoint (resource-only DLLs).
pub(crate) fn entry_point_rva(image: &[u8]) -> crate::Result<Option<u32>> {
    let (opt_offset, _) = optional_header(image)?;

    let rva: u32 = image.pread_with(opt_offset + 16, LE)?;

    Ok((rva != 0).then_some(rva))
}

/// Extracts `SizeOfImage` from the image headers.
pub(crate) fn image_size(image: &[u8]) -> crate::Result<u32> {
    let (opt_offset, _) = optional_header(image)?;

    image.pread_with(opt_offset + 56, LE).map_err(Into::into)
}

/// Looks up the RVA of a named export in a snapshot of a mapped image.
///
/// The snapshot must be in loaded layout, so every RVA in the export
/// directory indexes directly into it. A missing export table or an absent
/// name resolves to `None`; only malformed headers are errors.
pub(crate) fn export_rva(image: &[u8], symbol: &str) -> crate::Result<Option<u32>> {
    let (opt_offset, magic) = optional_header(image)?;

    let directory_rva: u32 = if magic == MAGIC_PE32 {
        image.pread_with(opt_offset + 96, LE)?
    } else {
        image.pread_with(opt_offset + 112, LE)?
    };

    if directory_rva == 0 {
        return Ok(None);
    }

    let directory = directory_rva as usize;
    let name_count: u32 = image.pread_with(directory + 24, LE)?;
    let address_table: u32 = image.pread_with(directory + 28, LE)?;
    let name_table: u32 = image.pread_with(directory + 32, LE)?;
    let ordinal_table: u32 = image.pread_with(directory + 36, LE)?;

    for i in 0..name_count as usize {
        let name_rva: u32 = image.pread_with(name_table as usize + i * 4, LE)?;

        if !export_name_matches(image, name_rva as usize, symbol) {
            continue;
        }

        let ordinal: u16 = image.pread_with(ordinal_table as usize + i * 2, LE)?;
        let rva: u32 = image.pread_with(address_table as usize + usize::from(ordinal) * 4, LE)?;

        return Ok(Some(rva));
    }

    Ok(None)
}

fn export_name_matches(image: &[u8], offset: usize, symbol: &str) -> bool {
    image
        .get(offset..offset + symbol.len() + 1)
        .is_some_and(|name| &name[..symbol.len()] == symbol.as_bytes() && name[symbol.len()] == 0)
}

#[cfg(test)]
mod tests {
    use super::{entry_point_rva, export_rva, image_size};

    const PE_OFFSET: usize = 0x80;
    const OPT_OFFSET: usize = PE_OFFSET + 0x18;
    const EXPORT_DIR: usize = 0x200;
    const ADDRESS_TABLE: usize = 0x300;
    const NAME_TABLE: usize = 0x340;
    const ORDINAL_TABLE: usize = 0x380;
    const NAME_DATA: usize = 0x400;

    fn put32(image: &mut [u8], offset: usize, value: u32) {
        image[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn put16(image: &mut [u8], offset: usize, value: u16) {
        image[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    /// Builds a loaded-layout PE32+ image with the given entrypoint, size
    /// and exports (name, rva).
    fn synthetic_image(entry: u32, size: u32, exports: &[(&str, u32)]) -> Vec<u8> {
        let mut image = vec![0u8; 0x1000];

        put32(&mut image, 0x3c, PE_OFFSET as u32);
        put32(&mut image, PE_OFFSET, 0x0000_4550);
        put16(&mut image, OPT_OFFSET, 0x20b);
        put32(&mut image, OPT_OFFSET + 16, entry);
        put32(&mut image, OPT_OFFSET + 56, size);

        if !exports.is_empty() {
            put32(&mut image, OPT_OFFSET + 112, EXPORT_DIR as u32);
            put32(&mut image, EXPORT_DIR + 24, exports.len() as u32);
            put32(&mut image, EXPORT_DIR + 28, ADDRESS_TABLE as u32);
            put32(&mut image, EXPORT_DIR + 32, NAME_TABLE as u32);
            put32(&mut image, EXPORT_DIR + 36, ORDINAL_TABLE as u32);

            let mut name_offset = NAME_DATA;
            for (i, (name, rva)) in exports.iter().enumerate() {
                put32(&mut image, NAME_TABLE + i * 4, name_offset as u32);
                image[name_offset..name_offset + name.len()].copy_from_slice(name.as_bytes());
                name_offset += name.len() + 1;

                // exports listed in reverse ordinal order, to catch walks
                // that ignore the ordinal table
                let ordinal = (exports.len() - 1 - i) as u16;
                put16(&mut image, ORDINAL_TABLE + i * 2, ordinal);
                put32(&mut image, ADDRESS_TABLE + usize::from(ordinal) * 4, *rva);
            }
        }

        image
    }

    #[test]
    fn entrypoint_and_size_are_extracted() {
        let image = synthetic_image(0x1234, 0x8_0000, &[]);

        assert_eq!(entry_point_rva(&image).unwrap(), Some(0x1234));
        assert_eq!(image_size(&image).unwrap(), 0x8_0000);
    }

    #[test]
    fn zero_entrypoint_reads_as_absent() {
        let image = synthetic_image(0, 0x1000, &[]);

        assert_eq!(entry_point_rva(&image).unwrap(), None);
    }

    #[test]
    fn corrupt_signature_is_rejected() {
        let mut image = synthetic_image(0x1000, 0x1000, &[]);
        image[PE_OFFSET] = b'M';

        assert!(matches!(
            entry_point_rva(&image),
            Err(crate::Error::BadPe("signature mismatch")),
        ));
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut image = synthetic_image(0x1000, 0x1000, &[]);
        put16(&mut image, OPT_OFFSET, 0x30b);

        assert!(matches!(
            image_size(&image),
            Err(crate::Error::BadPe("unknown optional header magic")),
        ));
    }

    #[test]
    fn truncated_image_is_rejected() {
        let image = synthetic_image(0x1000, 0x1000, &[]);

        assert!(matches!(
            entry_point_rva(&image[..0x40]),
            Err(crate::Error::BadPe("truncated image")),
        ));
    }

    #[test]
    fn export_is_resolved_through_the_ordinal_table() {
        let image = synthetic_image(0x1000, 0x1000, &[("alpha", 0x1111), ("fuzz_me", 0x2222)]);

        assert_eq!(export_rva(&image, "fuzz_me").unwrap(), Some(0x2222));
        assert_eq!(export_rva(&image, "alpha").unwrap(), Some(0x1111));
    }

    #[test]
    fn missing_export_is_not_an_error() {
        let image = synthetic_image(0x1000, 0x1000, &[("alpha", 0x1111)]);

        assert_eq!(export_rva(&image, "beta").unwrap(), None);
        // prefix of an existing name must not match
        assert_eq!(export_rva(&image, "alph").unwrap(), None);
    }

    #[test]
    fn image_without_export_table_resolves_nothing() {
        let image = synthetic_image(0x1000, 0x1000, &[]);

        assert_eq!(export_rva(&image, "fuzz_me").unwrap(), None);
    }
}
