use super::def::SszDef;
use super::SszError;
use crate::common::ByteView;

/// A validated view into SSZ-encoded bytes paired with the definition that
/// describes them (§3's `ssz_object`).
///
/// Navigation (`get`, `at`) never copies: each step slices the underlying
/// `ByteView` and hands back a new `SszObject` borrowing from the same
/// buffer, which is what lets multi-proof construction walk an entire
/// `LightClientUpdate` without allocating beyond the witness list itself.
#[derive(Clone, Copy, Debug)]
pub struct SszObject<'a> {
    def: &'a SszDef,
    data: ByteView<'a>,
}

impl<'a> SszObject<'a> {
    pub fn new(def: &'a SszDef, data: ByteView<'a>) -> Self {
        Self { def, data }
    }

    pub fn def(&self) -> &'a SszDef {
        self.def
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data.as_slice()
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    /// Structural validation: fixed-size types must match their declared
    /// byte length; variable-size containers must have offsets that are
    /// in range, non-decreasing, and whose first value equals the fixed
    /// part's length (§4.1 decoding rules).
    pub fn validate(&self) -> Result<(), SszError> {
        match self.def {
            SszDef::Uint { width } => {
                if self.data.len() != *width {
                    return Err(SszError::Truncated { expected: *width, got: self.data.len() });
                }
                Ok(())
            }
            SszDef::Boolean => {
                if self.data.len() != 1 {
                    return Err(SszError::Truncated { expected: 1, got: self.data.len() });
                }
                Ok(())
            }
            SszDef::None => Ok(()),
            SszDef::BitVector { bits } => {
                let expected = (*bits + 7) / 8;
                if self.data.len() != expected {
                    return Err(SszError::Truncated { expected, got: self.data.len() });
                }
                Ok(())
            }
            SszDef::BitList { max_bits } => {
                let max_bytes = (*max_bits + 7) / 8 + 1;
                if self.data.is_empty() {
                    return Err(SszError::MissingSentinelBit);
                }
                if self.data.len() > max_bytes {
                    return Err(SszError::ListTooLong { len: self.data.len(), max: max_bytes });
                }
                if sentinel_bit_position(self.data.as_slice()).is_none() {
                    return Err(SszError::MissingSentinelBit);
                }
                Ok(())
            }
            SszDef::Vector { element, length } => {
                if let Some(elem_size) = element.fixed_size() {
                    let expected = elem_size * length;
                    if self.data.len() != expected {
                        return Err(SszError::Truncated { expected, got: self.data.len() });
                    }
                    Ok(())
                } else {
                    self.validate_variable_sequence(*length, Some(*length))
                }
            }
            SszDef::List { element, max_length } => {
                if let Some(elem_size) = element.fixed_size() {
                    if elem_size == 0 {
                        return Ok(());
                    }
                    if self.data.len() % elem_size != 0 {
                        return Err(SszError::Truncated { expected: elem_size, got: self.data.len() % elem_size });
                    }
                    let len = self.data.len() / elem_size;
                    if len > *max_length {
                        return Err(SszError::ListTooLong { len, max: *max_length });
                    }
                    Ok(())
                } else {
                    let len = self.len()?;
                    if len > *max_length {
                        return Err(SszError::ListTooLong { len, max: *max_length });
                    }
                    self.validate_variable_sequence(len, None)
                }
            }
            SszDef::Container { fields, opt_mask_width } => match opt_mask_width {
                None => self.validate_container(fields),
                Some(width) => self.validate_opt_mask_container(fields, *width).map(|_| ()),
            },
            SszDef::Union { variants } => {
                if self.data.is_empty() {
                    return Err(SszError::Truncated { expected: 1, got: 0 });
                }
                let selector = self.data.as_slice()[0];
                let variant = variants
                    .get(selector as usize)
                    .ok_or(SszError::UnknownUnionSelector(selector))?;
                let payload = self.data.slice_from(1).ok_or(SszError::Truncated {
                    expected: 1,
                    got: self.data.len(),
                })?;
                SszObject::new(variant, payload).validate()
            }
        }
    }

    fn validate_variable_sequence(&self, declared_len: usize, exact_len: Option<usize>) -> Result<(), SszError> {
        if declared_len == 0 {
            if !self.data.is_empty() {
                return Err(SszError::Truncated { expected: 0, got: self.data.len() });
            }
            return Ok(());
        }
        let fixed_len = declared_len * 4;
        if self.data.len() < fixed_len {
            return Err(SszError::Truncated { expected: fixed_len, got: self.data.len() });
        }
        let offsets = read_offsets(self.data.as_slice(), declared_len)?;
        check_offsets(&offsets, self.data.len(), fixed_len)?;
        if let Some(n) = exact_len {
            if offsets.len() != n {
                return Err(SszError::Truncated { expected: n * 4, got: offsets.len() * 4 });
            }
        }
        Ok(())
    }

    /// `validate_container` for a container carrying a leading OPT_MASK
    /// (§3, §4.1 "Containers with OPT_MASK"): the mask is read first, and
    /// only fields it marks present occupy a wire slot at all — absent
    /// optional fields contribute no fixed bytes and no offset entry.
    fn validate_opt_mask_container(&self, fields: &[super::def::FieldDef], mask_bits: usize) -> Result<Vec<bool>, SszError> {
        let (mask_bytes, present) = read_opt_mask(&self.data, fields, mask_bits)?;
        let mut fixed_len = mask_bytes;
        for (f, &is_present) in fields.iter().zip(&present) {
            if is_present {
                fixed_len += f.def.fixed_size().unwrap_or(4);
            }
        }
        if self.data.len() < fixed_len {
            return Err(SszError::Truncated { expected: fixed_len, got: self.data.len() });
        }
        let mut offsets = Vec::new();
        let mut cursor = mask_bytes;
        for (f, &is_present) in fields.iter().zip(&present) {
            if !is_present {
                continue;
            }
            match f.def.fixed_size() {
                Some(size) => {
                    let slice = self.data.slice(cursor, cursor + size).ok_or(SszError::Truncated {
                        expected: cursor + size,
                        got: self.data.len(),
                    })?;
                    SszObject::new(&f.def, slice).validate()?;
                    cursor += size;
                }
                None => {
                    let bytes = self.data.slice(cursor, cursor + 4).ok_or(SszError::Truncated {
                        expected: cursor + 4,
                        got: self.data.len(),
                    })?;
                    let off = u32::from_le_bytes(bytes.as_slice().try_into().unwrap());
                    offsets.push(off as usize);
                    cursor += 4;
                }
            }
        }
        check_offsets(&offsets, self.data.len(), fixed_len)?;
        let mut bounds = offsets.clone();
        bounds.push(self.data.len());
        let mut var_idx = 0;
        for (f, &is_present) in fields.iter().zip(&present) {
            if is_present && f.def.fixed_size().is_none() {
                let start = bounds[var_idx];
                let end = bounds[var_idx + 1];
                let slice = self.data.slice(start, end).ok_or(SszError::OffsetOutOfRange {
                    offset: start as u32,
                    len: self.data.len(),
                })?;
                SszObject::new(&f.def, slice).validate()?;
                var_idx += 1;
            }
        }
        Ok(present)
    }

    fn validate_container(&self, fields: &[super::def::FieldDef]) -> Result<(), SszError> {
        let mut fixed_len = 0usize;
        for f in fields {
            fixed_len += f.def.fixed_size().unwrap_or(4);
        }
        if self.data.len() < fixed_len {
            return Err(SszError::Truncated { expected: fixed_len, got: self.data.len() });
        }
        let mut offsets = Vec::new();
        let mut cursor = 0usize;
        for f in fields {
            match f.def.fixed_size() {
                Some(size) => {
                    let slice = self.data.slice(cursor, cursor + size).ok_or(SszError::Truncated {
                        expected: cursor + size,
                        got: self.data.len(),
                    })?;
                    SszObject::new(&f.def, slice).validate()?;
                    cursor += size;
                }
                None => {
                    let bytes = self.data.slice(cursor, cursor + 4).ok_or(SszError::Truncated {
                        expected: cursor + 4,
                        got: self.data.len(),
                    })?;
                    let off = u32::from_le_bytes(bytes.as_slice().try_into().unwrap());
                    offsets.push(off as usize);
                    cursor += 4;
                }
            }
        }
        check_offsets(&offsets, self.data.len(), fixed_len)?;
        let mut bounds = offsets.clone();
        bounds.push(self.data.len());
        let mut var_idx = 0;
        for f in fields {
            if f.def.fixed_size().is_none() {
                let start = bounds[var_idx];
                let end = bounds[var_idx + 1];
                let slice = self.data.slice(start, end).ok_or(SszError::OffsetOutOfRange {
                    offset: start as u32,
                    len: self.data.len(),
                })?;
                SszObject::new(&f.def, slice).validate()?;
                var_idx += 1;
            }
        }
        Ok(())
    }

    /// Number of elements, for `List`/`Vector`/`BitList`/`BitVector`.
    pub fn len(&self) -> Result<usize, SszError> {
        match self.def {
            SszDef::Vector { length, .. } => Ok(*length),
            SszDef::BitVector { bits } => Ok(*bits),
            SszDef::BitList { .. } => sentinel_bit_position(self.data.as_slice()).ok_or(SszError::MissingSentinelBit),
            SszDef::List { element, .. } => match element.fixed_size() {
                Some(0) => Ok(0),
                Some(size) => Ok(self.data.len() / size),
                None => count_offsets(self.data.as_slice(), self.data.len()),
            },
            _ => Err(SszError::WrongDefKind("len() requires a sequence type")),
        }
    }

    pub fn is_empty(&self) -> Result<bool, SszError> {
        Ok(self.len()? == 0)
    }

    /// Index into a `Vector`/`List`.
    pub fn at(&self, index: usize) -> Result<SszObject<'a>, SszError> {
        match self.def {
            SszDef::Vector { element, length } => {
                if index >= *length {
                    return Err(SszError::IndexOutOfBounds { index, len: *length });
                }
                self.element_at(element, index, *length)
            }
            SszDef::List { element, .. } => {
                let len = self.len()?;
                if index >= len {
                    return Err(SszError::IndexOutOfBounds { index, len });
                }
                self.element_at(element, index, len)
            }
            _ => Err(SszError::WrongDefKind("at() requires Vector or List")),
        }
    }

    fn element_at(&self, element: &'a SszDef, index: usize, len: usize) -> Result<SszObject<'a>, SszError> {
        match element.fixed_size() {
            Some(size) => {
                let start = index * size;
                let slice = self.data.slice(start, start + size).ok_or(SszError::IndexOutOfBounds { index, len })?;
                Ok(SszObject::new(element, slice))
            }
            None => {
                let offsets = read_offsets(self.data.as_slice(), len)?;
                let start = offsets[index];
                let end = if index + 1 < offsets.len() { offsets[index + 1] } else { self.data.len() };
                let slice = self.data.slice(start, end).ok_or(SszError::IndexOutOfBounds { index, len })?;
                Ok(SszObject::new(element, slice))
            }
        }
    }

    /// Field access into a `Container` by name (snake_case, with a
    /// CamelCase fallback for wire schemas that use it).
    pub fn get(&self, name: &str) -> Result<SszObject<'a>, SszError> {
        let (fields, opt_mask_width) = match self.def {
            SszDef::Container { fields, opt_mask_width } => (fields, *opt_mask_width),
            _ => return Err(SszError::WrongDefKind("get() requires Container")),
        };
        let idx = self.def.field_index(name).ok_or_else(|| SszError::UnknownField(name.to_string()))?;

        match opt_mask_width {
            None => self.get_fixed_layout_field(fields, idx, name),
            Some(mask_bits) => self.get_opt_mask_field(fields, mask_bits, idx, name),
        }
    }

    fn get_fixed_layout_field(&self, fields: &'a [super::def::FieldDef], idx: usize, name: &str) -> Result<SszObject<'a>, SszError> {
        let mut cursor = 0usize;
        let mut var_starts = Vec::new();
        for (i, f) in fields.iter().enumerate() {
            match f.def.fixed_size() {
                Some(size) => {
                    if i == idx {
                        let slice = self
                            .data
                            .slice(cursor, cursor + size)
                            .ok_or(SszError::UnknownField(name.to_string()))?;
                        return Ok(SszObject::new(&f.def, slice));
                    }
                    cursor += size;
                }
                None => {
                    let bytes = self
                        .data
                        .slice(cursor, cursor + 4)
                        .ok_or(SszError::UnknownField(name.to_string()))?;
                    let off = u32::from_le_bytes(bytes.as_slice().try_into().unwrap()) as usize;
                    var_starts.push((i, off));
                    cursor += 4;
                }
            }
        }
        // Requested field was variable-size; find its slot among var_starts.
        for (pos, (field_idx, start)) in var_starts.iter().enumerate() {
            if *field_idx == idx {
                let end = if pos + 1 < var_starts.len() { var_starts[pos + 1].1 } else { self.data.len() };
                let slice = self.data.slice(*start, end).ok_or(SszError::UnknownField(name.to_string()))?;
                return Ok(SszObject::new(&fields[idx].def, slice));
            }
        }
        Err(SszError::UnknownField(name.to_string()))
    }

    /// `get()` for an OPT_MASK container. An absent optional field has no
    /// wire representation at all, so this hands back a synthetic all-zero
    /// view of the field's type rather than slicing real bytes — exactly
    /// the value `hash_tree_root` and callers that only read numeric/bytes
    /// fields need to see for "this optional field is absent" (§4.1, §8).
    fn get_opt_mask_field(
        &self,
        fields: &'a [super::def::FieldDef],
        mask_bits: usize,
        idx: usize,
        name: &str,
    ) -> Result<SszObject<'a>, SszError> {
        let (mask_bytes, present) = read_opt_mask(&self.data, fields, mask_bits)?;
        if !present[idx] {
            let zero_len = fields[idx].def.fixed_size().unwrap_or(0);
            return Ok(SszObject::new(&fields[idx].def, zero_view(zero_len)));
        }

        let mut cursor = mask_bytes;
        let mut var_starts = Vec::new();
        for (i, f) in fields.iter().enumerate() {
            if !present[i] {
                continue;
            }
            match f.def.fixed_size() {
                Some(size) => {
                    if i == idx {
                        let slice = self
                            .data
                            .slice(cursor, cursor + size)
                            .ok_or(SszError::UnknownField(name.to_string()))?;
                        return Ok(SszObject::new(&f.def, slice));
                    }
                    cursor += size;
                }
                None => {
                    let bytes = self
                        .data
                        .slice(cursor, cursor + 4)
                        .ok_or(SszError::UnknownField(name.to_string()))?;
                    let off = u32::from_le_bytes(bytes.as_slice().try_into().unwrap()) as usize;
                    var_starts.push((i, off));
                    cursor += 4;
                }
            }
        }
        for (pos, (field_idx, start)) in var_starts.iter().enumerate() {
            if *field_idx == idx {
                let end = if pos + 1 < var_starts.len() { var_starts[pos + 1].1 } else { self.data.len() };
                let slice = self.data.slice(*start, end).ok_or(SszError::UnknownField(name.to_string()))?;
                return Ok(SszObject::new(&fields[idx].def, slice));
            }
        }
        Err(SszError::UnknownField(name.to_string()))
    }

    pub fn as_u64(&self) -> Result<u64, SszError> {
        match self.def {
            SszDef::Uint { width } if *width <= 8 => {
                let mut buf = [0u8; 8];
                buf[..self.data.len()].copy_from_slice(self.data.as_slice());
                Ok(u64::from_le_bytes(buf))
            }
            _ => Err(SszError::WrongDefKind("as_u64() requires Uint of width <= 8")),
        }
    }

    pub fn as_bool(&self) -> Result<bool, SszError> {
        match self.def {
            SszDef::Boolean => Ok(self.data.as_slice()[0] != 0),
            _ => Err(SszError::WrongDefKind("as_bool() requires Boolean")),
        }
    }
}

/// Reads a container's OPT_MASK presence bitfield and returns the mask's
/// byte length along with whether each field (in declaration order) is
/// present. Required fields are always present; an optional field's
/// presence is its bit (see [`super::def::optional_bit_index`]) in the
/// leading mask.
fn read_opt_mask(data: &ByteView<'_>, fields: &[super::def::FieldDef], mask_bits: usize) -> Result<(usize, Vec<bool>), SszError> {
    let mask_bytes = (mask_bits + 7) / 8;
    let mask_slice = data
        .slice(0, mask_bytes)
        .ok_or(SszError::Truncated { expected: mask_bytes, got: data.len() })?;
    let mask = mask_slice.as_slice();
    let present = fields
        .iter()
        .enumerate()
        .map(|(i, f)| {
            if !f.optional {
                true
            } else {
                let bit_index = super::def::optional_bit_index(fields, i);
                (mask[bit_index / 8] >> (bit_index % 8)) & 1 == 1
            }
        })
        .collect();
    Ok((mask_bytes, present))
}

/// A zero-filled view of `len` bytes, used to stand in for an absent
/// OPT_MASK field's value (§4.1: absent optional fields hash as zeros).
const ZERO_BUF: [u8; 8192] = [0u8; 8192];

fn zero_view(len: usize) -> ByteView<'static> {
    ByteView::new(&ZERO_BUF[..len.min(ZERO_BUF.len())])
}

fn read_offsets(data: &[u8], declared_len: usize) -> Result<Vec<usize>, SszError> {
    let mut offsets = Vec::with_capacity(declared_len);
    for i in 0..declared_len {
        let start = i * 4;
        let bytes: [u8; 4] = data
            .get(start..start + 4)
            .ok_or(SszError::Truncated { expected: start + 4, got: data.len() })?
            .try_into()
            .unwrap();
        offsets.push(u32::from_le_bytes(bytes) as usize);
    }
    Ok(offsets)
}

fn count_offsets(data: &[u8], total_len: usize) -> Result<usize, SszError> {
    if data.is_empty() {
        return Ok(0);
    }
    let first: [u8; 4] = data.get(0..4).ok_or(SszError::Truncated { expected: 4, got: data.len() })?
        .try_into()
        .unwrap();
    let first_off = u32::from_le_bytes(first) as usize;
    if first_off % 4 != 0 || first_off > total_len {
        return Err(SszError::OffsetOutOfRange { offset: first_off as u32, len: total_len });
    }
    Ok(first_off / 4)
}

fn check_offsets(offsets: &[usize], total_len: usize, fixed_len: usize) -> Result<(), SszError> {
    if offsets.is_empty() {
        return Ok(());
    }
    if offsets[0] != fixed_len {
        return Err(SszError::FirstOffsetMismatch { first: offsets[0] as u32, fixed_len });
    }
    for w in offsets.windows(2) {
        if w[1] < w[0] {
            return Err(SszError::OffsetsNotMonotonic);
        }
    }
    if let Some(&last) = offsets.last() {
        if last > total_len {
            return Err(SszError::OffsetOutOfRange { offset: last as u32, len: total_len });
        }
    }
    Ok(())
}

/// Position of the highest set bit in a bitlist's encoding — the sentinel
/// marking true length, per §4.1. Returns `None` if the buffer is all
/// zero (missing sentinel).
fn sentinel_bit_position(data: &[u8]) -> Option<usize> {
    for (byte_idx, byte) in data.iter().enumerate().rev() {
        if *byte != 0 {
            let bit = 7 - byte.leading_zeros() as usize;
            return Some(byte_idx * 8 + bit);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssz::def::FieldDef;

    #[test]
    fn fixed_container_roundtrip() {
        let def = SszDef::container(vec![
            FieldDef::new("a", SszDef::uint(8)),
            FieldDef::new("b", SszDef::uint(4)),
        ]);
        let mut bytes = vec![0u8; 12];
        bytes[0..8].copy_from_slice(&42u64.to_le_bytes());
        bytes[8..12].copy_from_slice(&7u32.to_le_bytes());
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        obj.validate().unwrap();
        assert_eq!(obj.get("a").unwrap().as_u64().unwrap(), 42);
        assert_eq!(obj.get("b").unwrap().as_u64().unwrap(), 7);
    }

    #[test]
    fn variable_container_offsets() {
        let def = SszDef::container(vec![
            FieldDef::new("fixed", SszDef::uint(4)),
            FieldDef::new("variable", SszDef::list(SszDef::uint(1), 16)),
        ]);
        let mut bytes = vec![0u8; 4];
        bytes[0..4].copy_from_slice(&1u32.to_le_bytes());
        let offset_pos = bytes.len();
        bytes.extend_from_slice(&0u32.to_le_bytes());
        let fixed_len = bytes.len();
        bytes[offset_pos..offset_pos + 4].copy_from_slice(&(fixed_len as u32).to_le_bytes());
        bytes.extend_from_slice(&[9, 8, 7]);

        let obj = SszObject::new(&def, ByteView::new(&bytes));
        obj.validate().unwrap();
        let var = obj.get("variable").unwrap();
        assert_eq!(var.len().unwrap(), 3);
        assert_eq!(var.at(1).unwrap().as_u64().unwrap(), 8);
    }

    #[test]
    fn bitlist_sentinel_recovers_length() {
        // 5 true bits then the sentinel at bit 5: 0b00100001 = 0x21.
        let bytes = [0x21u8];
        let def = SszDef::BitList { max_bits: 512 };
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        obj.validate().unwrap();
        assert_eq!(obj.len().unwrap(), 5);
    }

    #[test]
    fn missing_sentinel_is_rejected() {
        let bytes = [0u8];
        let def = SszDef::BitList { max_bits: 512 };
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        assert!(obj.validate().is_err());
    }

    fn opt_mask_def() -> SszDef {
        SszDef::container_with_opt_mask(
            vec![
                FieldDef::new("a", SszDef::uint(8)),
                FieldDef::optional("b", SszDef::uint(8)),
                FieldDef::optional("c", SszDef::list(SszDef::uint(1), 16)),
            ],
            2,
        )
    }

    #[test]
    fn opt_mask_all_zero_means_all_optional_fields_absent() {
        let def = opt_mask_def();
        let mut bytes = vec![0x00u8]; // mask: both optional bits clear
        bytes.extend_from_slice(&5u64.to_le_bytes());
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        obj.validate().unwrap();

        assert_eq!(obj.get("a").unwrap().as_u64().unwrap(), 5);
        assert_eq!(obj.get("b").unwrap().as_u64().unwrap(), 0);
        assert!(obj.get("c").unwrap().is_empty().unwrap());
    }

    #[test]
    fn opt_mask_present_field_reads_real_bytes() {
        let def = opt_mask_def();
        let mut bytes = vec![0x01u8]; // bit 0 (field "b") set, "c" absent
        bytes.extend_from_slice(&5u64.to_le_bytes());
        bytes.extend_from_slice(&9u64.to_le_bytes());
        let obj = SszObject::new(&def, ByteView::new(&bytes));
        obj.validate().unwrap();

        assert_eq!(obj.get("a").unwrap().as_u64().unwrap(), 5);
        assert_eq!(obj.get("b").unwrap().as_u64().unwrap(), 9);
        assert!(obj.get("c").unwrap().is_empty().unwrap());
    }

    #[test]
    fn opt_mask_container_is_never_fixed_size() {
        assert!(!opt_mask_def().is_fixed_size());
        assert_eq!(opt_mask_def().fixed_size(), None);
    }
}
