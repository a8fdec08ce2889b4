//! The table serialization engine of the `#~` stream.
//!
//! # Layout
//!
//! ```text
//! u32  reserved, 0
//! u8   major version, 2
//! u8   minor version, 0
//! u8   HeapSizes
//! u8   reserved, 1
//! u64  present tables
//! u64  sorted tables
//! u32  row count of every present table, ascending kind order
//! u32  extra data, only if HeapSizes has 0x40 set
//! ...  rows of every present table, ascending kind order
//! ```
//!
//! Reading happens in two phases. [`RawTables::read`] decodes the header, derives the
//! index widths from the row counts and heap flags, and reads every row into positional
//! `u32` values. [`RawTables::resolve`] then turns the raw rows into typed [`Cell`]s, doing
//! the heap lookups and blob parsing that need the complete set of sizes.
//!
//! Writing ([`write_tables`]) first encodes every cell into its raw value, interning heap
//! content and laying out raw data along the way, so that the final heap sizes are known
//! before any row is emitted.

use std::sync::Arc;

use crate::{
    file::io::{push_le, push_le_dyn, read_le_at, read_le_at_dyn},
    metadata::{
        constant::{encode_constant, parse_constant},
        customattributes::encode_custom_attribute,
        marshalling::{encode_marshalling_descriptor, parse_marshalling_descriptor},
        sections::SectionPartBuilder,
        security::{encode_permission_set, parse_permission_set},
        signatures::{
            encode_field_signature, encode_local_var_signature, encode_method_signature,
            encode_method_spec_signature, encode_property_signature, encode_typespec_signature,
            parse_field_signature, parse_local_var_signature, parse_method_signature,
            parse_method_spec_signature, parse_property_signature, parse_type_spec_signature,
            SIGNATURE_HEADER,
        },
        streams::{HeapBuilders, HeapReaders},
    },
    Error, Result,
};

use super::{
    is_large_stream, Blob, BlobKind, Cell, ColumnCodec, ColumnDescriptor, DataKind, HeapKind,
    RawData, RawDataKind, SchemaRegistry, TableDescriptor, TableId, TableIndex, TableInfo, Tables,
    HEAP_EXTRA_DATA,
};

/// Major version written into the `#~` header
pub const TABLES_MAJOR_VERSION: u8 = 2;
/// Minor version written into the `#~` header
pub const TABLES_MINOR_VERSION: u8 = 0;

const POINTER_TABLES: [TableId; 5] = [
    TableId::FIELD_PTR,
    TableId::METHOD_PTR,
    TableId::PARAM_PTR,
    TableId::EVENT_PTR,
    TableId::PROPERTY_PTR,
];

/// The fixed part of the `#~` stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablesHeader {
    /// Major version
    pub major_version: u8,
    /// Minor version
    pub minor_version: u8,
    /// The `HeapSizes` flags
    pub heap_sizes: u8,
    /// Bitmask of present tables
    pub valid: u64,
    /// Bitmask of sorted tables
    pub sorted: u64,
    /// Row counts indexed by table kind
    pub rows: [u32; 64],
    /// Offset of the first row
    pub rows_offset: usize,
}

impl TablesHeader {
    /// Parse the header of a `#~` stream.
    ///
    /// # Errors
    /// Returns an error if the stream is truncated or no table is present
    pub fn read(data: &[u8]) -> Result<TablesHeader> {
        if data.len() < 24 {
            return Err(Error::OutOfBounds);
        }

        let mut offset = 4;
        let major_version = read_le_at::<u8>(data, &mut offset)?;
        let minor_version = read_le_at::<u8>(data, &mut offset)?;
        let heap_sizes = read_le_at::<u8>(data, &mut offset)?;
        offset += 1;
        let valid = read_le_at::<u64>(data, &mut offset)?;
        let sorted = read_le_at::<u64>(data, &mut offset)?;

        if valid == 0 {
            return Err(malformed_error!("No valid rows in any of the tables"));
        }

        let mut rows = [0_u32; 64];
        for table in TableId::all() {
            if valid & table.bit() != 0 {
                rows[table.index()] = read_le_at::<u32>(data, &mut offset)?;
            }
        }

        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            let _extra = read_le_at::<u32>(data, &mut offset)?;
        }

        Ok(TablesHeader {
            major_version,
            minor_version,
            heap_sizes,
            valid,
            sorted,
            rows,
            rows_offset: offset,
        })
    }

    /// Number of present tables
    #[must_use]
    pub fn table_count(&self) -> u32 {
        self.valid.count_ones()
    }
}

/// Serialized byte width of one row of `descriptor`
#[must_use]
pub fn row_size(descriptor: &TableDescriptor, info: &TableInfo) -> usize {
    descriptor
        .columns
        .iter()
        .map(|column| usize::from(column.width(info)))
        .sum()
}

/// The rows of a `#~` stream as positional values, before any cross reference or heap
/// lookup is resolved.
#[derive(Debug, Clone)]
pub struct RawTables {
    /// The stream header
    pub header: TablesHeader,
    /// Index widths derived from the header
    pub info: TableInfo,
    rows: Vec<Vec<Vec<u32>>>,
}

impl RawTables {
    /// Read all rows of a `#~` stream.
    ///
    /// `custom_heaps` gives the large flag of every custom string heap the schema uses.
    ///
    /// # Errors
    /// Returns an error if a present table has no schema, a pointer table is present, or
    /// the rows do not fit the stream
    pub fn read(
        data: &[u8],
        schema: &SchemaRegistry,
        custom_heaps: Vec<(&'static str, bool)>,
    ) -> Result<RawTables> {
        let header = TablesHeader::read(data)?;
        let info = TableInfo::new(header.rows, header.heap_sizes, custom_heaps);

        let mut rows = vec![Vec::new(); 64];
        let mut offset = header.rows_offset;
        for table in TableId::all() {
            if header.valid & table.bit() == 0 {
                continue;
            }

            let count = header.rows[table.index()];
            if count > 0 && POINTER_TABLES.contains(&table) {
                log::warn!("{} table present, uncompressed table layouts are unsupported", table);
                return Err(Error::NotSupported);
            }

            let descriptor = schema.descriptor(table)?;
            let size = row_size(descriptor, &info);
            let end = (count as usize)
                .checked_mul(size)
                .and_then(|len| len.checked_add(offset))
                .filter(|end| *end <= data.len())
                .ok_or_else(|| {
                    malformed_error!(
                        "{} rows of {} ({} bytes each) exceed the #~ stream",
                        count,
                        table,
                        size
                    )
                })?;

            let mut table_rows = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let mut values = Vec::with_capacity(descriptor.columns.len());
                for column in &descriptor.columns {
                    values.push(read_value(data, &mut offset, column, &info)?);
                }
                table_rows.push(values);
            }
            debug_assert_eq!(offset, end);

            rows[table.index()] = table_rows;
        }

        Ok(RawTables { header, info, rows })
    }

    /// The raw rows of a table
    #[must_use]
    pub fn rows(&self, table: TableId) -> &[Vec<u32>] {
        &self.rows[table.index()]
    }

    /// Turn every raw row into a typed row.
    ///
    /// Custom attribute values stay unparsed and raw data references are kept as
    /// [`RawData::Unresolved`]; both need the complete graph and are resolved later.
    ///
    /// # Errors
    /// Returns a format error naming the table, column and row of the first value that
    /// cannot be decoded
    pub fn resolve(&self, heaps: &HeapReaders<'_>, schema: Arc<SchemaRegistry>) -> Result<Tables> {
        let mut tables = Tables::new(schema.clone());
        for table in TableId::all() {
            let raw_rows = self.rows(table);
            if raw_rows.is_empty() {
                continue;
            }

            let descriptor = schema.descriptor(table)?;
            for (row, raw) in raw_rows.iter().enumerate() {
                let cells = descriptor
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(column, descriptor)| {
                        decode_cell(descriptor.codec, raw, raw[column], heaps, &self.info)
                            .map_err(|error| in_column(table, descriptor, row, &error))
                    })
                    .collect::<Result<Vec<_>>>()?;
                tables.push_unchecked(table, cells);
            }
        }

        Ok(tables)
    }
}

fn in_column(table: TableId, column: &ColumnDescriptor, row: usize, error: &Error) -> Error {
    malformed_error!("{}.{} of row {}: {}", table, column.name, row + 1, error)
}

fn read_value(
    data: &[u8],
    offset: &mut usize,
    column: &ColumnDescriptor,
    info: &TableInfo,
) -> Result<u32> {
    match column.data_kind() {
        DataKind::Fixed(1) => Ok(u32::from(read_le_at::<u8>(data, offset)?)),
        DataKind::Fixed(2) => Ok(u32::from(read_le_at::<u16>(data, offset)?)),
        DataKind::Fixed(_) | DataKind::RawDataReference => read_le_at::<u32>(data, offset),
        kind => read_le_at_dyn(data, offset, kind.width(info) == 4),
    }
}

fn decode_cell(
    codec: ColumnCodec,
    raw_row: &[u32],
    value: u32,
    heaps: &HeapReaders<'_>,
    info: &TableInfo,
) -> Result<Cell> {
    Ok(match codec {
        ColumnCodec::U8 | ColumnCodec::U16 | ColumnCodec::U32 | ColumnCodec::U32As16 => {
            Cell::Int(value)
        }
        ColumnCodec::TableIndex(table) => {
            Cell::Index(value.checked_sub(1).map(|row| TableIndex::new(table, row)))
        }
        ColumnCodec::TableList(table) => {
            // A zero list start does not occur in valid images; treat it as the first row
            Cell::list(table, value.saturating_sub(1).min(info.rows(table)))
        }
        ColumnCodec::CodedIndex(coded) => Cell::Index(coded.decode(value)?),
        ColumnCodec::String(heap) => Cell::Str(heaps.string(heap, value)?.to_string()),
        ColumnCodec::Guid => match value {
            0 => Cell::Guid(None),
            index => Cell::Guid(Some(heaps.guid.get(index as usize)?)),
        },
        ColumnCodec::Blob(kind) => {
            let data = heaps.blob.get(value as usize)?;
            let element_type = match kind {
                BlobKind::Constant {
                    element_type_column,
                } => raw_row.get(element_type_column).map(|value| *value as u8),
                _ => None,
            };
            Cell::Blob(parse_blob(kind, data, element_type))
        }
        // Resource offsets start at 0; whether one is embedded depends on Implementation
        ColumnCodec::RawData(RawDataKind::ManifestResource) => {
            Cell::RawData(RawData::Unresolved(value))
        }
        ColumnCodec::RawData(_) => match value {
            0 => Cell::RawData(RawData::None),
            address => Cell::RawData(RawData::Unresolved(address)),
        },
    })
}

/// Interpret blob bytes according to the column's blob kind.
///
/// A blob that does not parse is kept as [`Blob::Bytes`]. So is a non-signature blob whose
/// parsed form would not encode back to the same bytes. Signatures are kept parsed even
/// then, normalizing non-minimal compressed integers, so the indices they embed stay
/// visible to remapping. Custom attribute values are always kept as bytes here, since
/// their layout depends on the constructor signature.
#[must_use]
pub fn parse_blob(kind: BlobKind, data: &[u8], element_type: Option<u8>) -> Blob {
    let first = data.first().copied();
    let parsed = match kind {
        BlobKind::Bytes | BlobKind::CustomAttribute => return Blob::Bytes(data.to_vec()),
        BlobKind::MethodSig => parse_method_signature(data).map(Blob::Method),
        BlobKind::FieldSig => parse_field_signature(data).map(Blob::Field),
        BlobKind::MemberRefSig if first == Some(SIGNATURE_HEADER::FIELD) => {
            parse_field_signature(data).map(Blob::Field)
        }
        BlobKind::MemberRefSig => parse_method_signature(data).map(Blob::Method),
        BlobKind::StandAloneSig => match first {
            Some(SIGNATURE_HEADER::LOCAL_SIG) => parse_local_var_signature(data).map(Blob::Locals),
            Some(SIGNATURE_HEADER::FIELD) => parse_field_signature(data).map(Blob::Field),
            _ => parse_method_signature(data).map(Blob::Method),
        },
        BlobKind::PropertySig => parse_property_signature(data).map(Blob::Property),
        BlobKind::TypeSpec => parse_type_spec_signature(data).map(Blob::TypeSpec),
        BlobKind::MethodSpec => parse_method_spec_signature(data).map(Blob::MethodSpec),
        BlobKind::Marshal => parse_marshalling_descriptor(data).map(Blob::Marshal),
        BlobKind::Security => parse_permission_set(data).map(Blob::Security),
        BlobKind::Constant { .. } => match element_type {
            Some(element_type) => parse_constant(element_type, data).map(Blob::Constant),
            None => Err(malformed_error!("Constant without element type")),
        },
    };

    match parsed {
        Ok(blob) if encode_blob(&blob).is_ok_and(|bytes| bytes == data) => blob,
        Ok(blob) if kind.is_signature() && encode_blob(&blob).is_ok() => {
            log::debug!("{:?} blob is not minimally encoded, normalized", kind);
            blob
        }
        Ok(_) => {
            log::debug!("{:?} blob does not re-encode identically, kept as bytes", kind);
            Blob::Bytes(data.to_vec())
        }
        Err(error) => {
            if !data.is_empty() {
                log::debug!("{:?} blob kept as bytes: {}", kind, error);
            }
            Blob::Bytes(data.to_vec())
        }
    }
}

/// Encode a blob value into its heap bytes.
///
/// # Errors
/// Returns an error if the parsed value cannot be represented
pub fn encode_blob(blob: &Blob) -> Result<Vec<u8>> {
    match blob {
        Blob::Bytes(bytes) => Ok(bytes.clone()),
        Blob::Method(signature) => encode_method_signature(signature),
        Blob::Field(signature) => encode_field_signature(signature),
        Blob::Property(signature) => encode_property_signature(signature),
        Blob::Locals(signature) => encode_local_var_signature(signature),
        Blob::TypeSpec(signature) => encode_typespec_signature(signature),
        Blob::MethodSpec(signature) => encode_method_spec_signature(signature),
        Blob::CustomAttribute(value) => encode_custom_attribute(value),
        Blob::Marshal(info) => encode_marshalling_descriptor(info),
        Blob::Security(set) => encode_permission_set(set),
        Blob::Constant(value) => Ok(encode_constant(value)),
    }
}

fn encode_cell(
    codec: ColumnCodec,
    cell: &Cell,
    heaps: &mut HeapBuilders,
    sections: &mut SectionPartBuilder,
) -> Result<u32> {
    match (codec, cell) {
        (ColumnCodec::U32As16, Cell::Int(value)) => Ok(value & 0xFFFF),
        (_, Cell::Int(value)) => Ok(*value),
        (ColumnCodec::CodedIndex(coded), Cell::Index(index)) => coded.encode(*index),
        (_, Cell::Index(index)) => Ok(index.map_or(0, TableIndex::one_based)),
        (ColumnCodec::String(HeapKind::Custom(name)), Cell::Str(value)) => {
            heaps.custom(name).intern(value)
        }
        (_, Cell::Str(value)) => heaps.strings.intern(value),
        (_, Cell::Guid(guid)) => Ok(guid.map_or(0, |guid| heaps.guid.intern(guid))),
        (_, Cell::Blob(blob)) => heaps.blob.intern(&encode_blob(blob)?),
        (_, Cell::RawData(data)) => match data {
            RawData::None => Ok(0),
            RawData::Unresolved(address) => Ok(*address),
            RawData::MethodBody(body) => sections.add_method_body(body, &mut heaps.user_strings),
            RawData::FieldData(bytes) => sections.add_field_data(bytes),
            RawData::Resource(bytes) => sections.add_resource(bytes),
        },
    }
}

/// Serialize every table into a `#~` stream.
///
/// Heap content is interned into `heaps` and raw data is laid out through `sections`.
/// Tables are written in their current row order; sorting is the caller's responsibility.
///
/// # Errors
/// Returns an error if a cell does not fit its column or heap content cannot be interned
pub fn write_tables(
    tables: &Tables,
    heaps: &mut HeapBuilders,
    sections: &mut SectionPartBuilder,
) -> Result<Vec<u8>> {
    let schema = tables.schema().clone();

    let mut raw_tables = Vec::new();
    for table in tables.present() {
        let descriptor = schema.descriptor(table.id())?;
        let mut raw_rows = Vec::with_capacity(table.len());
        for (index, row) in table.iter() {
            let raw = descriptor
                .columns
                .iter()
                .zip(row.cells())
                .map(|(column, cell)| {
                    encode_cell(column.codec, cell, heaps, sections)
                        .map_err(|error| in_column(table.id(), column, index.row as usize, &error))
                })
                .collect::<Result<Vec<_>>>()?;
            raw_rows.push(raw);
        }
        raw_tables.push((descriptor, raw_rows));
    }

    let mut heap_sizes = 0;
    if is_large_stream(heaps.strings.len()) {
        heap_sizes |= super::HEAP_LARGE_STRINGS;
    }
    if heaps.guid.len() > usize::from(u16::MAX) {
        heap_sizes |= super::HEAP_LARGE_GUID;
    }
    if is_large_stream(heaps.blob.len()) {
        heap_sizes |= super::HEAP_LARGE_BLOB;
    }
    let custom_heaps = heaps
        .custom
        .iter()
        .map(|(name, builder)| (*name, is_large_stream(builder.len())))
        .collect();
    let info = TableInfo::new(tables.row_counts(), heap_sizes, custom_heaps);

    let valid = tables
        .present()
        .fold(0_u64, |mask, table| mask | table.id().bit());

    let mut out = Vec::new();
    push_le(&mut out, 0_u32);
    push_le(&mut out, TABLES_MAJOR_VERSION);
    push_le(&mut out, TABLES_MINOR_VERSION);
    push_le(&mut out, heap_sizes);
    push_le(&mut out, 1_u8);
    push_le(&mut out, valid);
    push_le(&mut out, schema.sorted_mask());
    for table in tables.present() {
        push_le(&mut out, table.row_count());
    }

    for (descriptor, raw_rows) in raw_tables {
        for raw in raw_rows {
            for (column, value) in descriptor.columns.iter().zip(raw) {
                match column.data_kind() {
                    DataKind::Fixed(1) => out.push(value as u8),
                    DataKind::Fixed(2) => push_le(&mut out, value as u16),
                    DataKind::Fixed(_) | DataKind::RawDataReference => push_le(&mut out, value),
                    kind => push_le_dyn(&mut out, value, kind.width(&info) == 4)?,
                }
            }
        }
    }

    crate::file::io::align_to(&mut out, 4);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        constant::ConstantValue,
        signatures::{SignatureField, TypeSignature},
        streams::{BlobHeap, GuidHeap, Strings},
        tables::columns,
    };

    fn module_row(name: &str) -> Vec<Cell> {
        vec![
            Cell::Int(0),
            Cell::str(name),
            Cell::Guid(Some(uguid::guid!("01234567-89ab-cdef-0123-456789abcdef"))),
            Cell::Guid(None),
            Cell::Guid(None),
        ]
    }

    fn round_trip(tables: &Tables) -> Tables {
        let mut heaps = HeapBuilders::new();
        let mut sections = SectionPartBuilder::new(0x2000);
        let stream = write_tables(tables, &mut heaps, &mut sections).unwrap();

        let strings = heaps.strings.finish();
        let blob = heaps.blob.finish();
        let guid = heaps.guid.finish();
        let readers = HeapReaders::new(Some(&strings), Some(&blob), Some(&guid)).unwrap();

        let raw = RawTables::read(&stream, tables.schema(), Vec::new()).unwrap();
        raw.resolve(&readers, tables.schema().clone()).unwrap()
    }

    #[test]
    fn header_layout() {
        let mut tables = Tables::default();
        tables.push(TableId::MODULE, module_row("a.dll")).unwrap();

        let mut heaps = HeapBuilders::new();
        let mut sections = SectionPartBuilder::new(0x2000);
        let stream = write_tables(&tables, &mut heaps, &mut sections).unwrap();

        let header = TablesHeader::read(&stream).unwrap();
        assert_eq!(header.major_version, 2);
        assert_eq!(header.minor_version, 0);
        assert_eq!(header.valid, 1);
        assert_eq!(header.sorted, 0x0000_1600_3301_FA00);
        assert_eq!(header.rows[0], 1);
        assert_eq!(header.rows_offset, 28);
        assert_eq!(stream[7], 1);
        // Generation(2) + Name(2) + 3 GUIDs(2)
        assert_eq!(stream.len(), (28 + 10 + 3) & !3);
    }

    #[test]
    fn extra_data_is_skipped() {
        #[rustfmt::skip]
        let stream = [
            0x00, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x40, 0x01,
            0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0xEE, 0xEE, 0xEE, 0xEE,
            0x05, 0x00,
        ];
        let raw = RawTables::read(&stream, &SchemaRegistry::canonical(), Vec::new()).unwrap();
        assert_eq!(raw.header.rows_offset, 32);
        assert_eq!(raw.rows(TableId::MODULE_REF), &[vec![5]]);
    }

    #[test]
    fn rejects_bad_streams() {
        assert!(TablesHeader::read(&[0; 16]).is_err());
        assert!(TablesHeader::read(&[0; 24]).is_err());

        // One ModuleRef row declared, no row data
        #[rustfmt::skip]
        let truncated = [
            0x00, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x01,
            0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
        ];
        assert!(RawTables::read(&truncated, &SchemaRegistry::canonical(), Vec::new()).is_err());

        // A FieldPtr row
        #[rustfmt::skip]
        let pointers = [
            0x00, 0x00, 0x00, 0x00,
            0x02, 0x00, 0x00, 0x01,
            0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x01, 0x00,
        ];
        assert!(matches!(
            RawTables::read(&pointers, &SchemaRegistry::canonical(), Vec::new()),
            Err(Error::NotSupported)
        ));

        // An extension table without a schema
        let mut missing = truncated;
        missing[8..16].copy_from_slice(&(1_u64 << 0x30).to_le_bytes());
        assert!(matches!(
            RawTables::read(&missing, &SchemaRegistry::canonical(), Vec::new()),
            Err(Error::MissingSchema(0x30))
        ));
    }

    #[test]
    fn decode_errors_name_the_column() {
        let schema = SchemaRegistry::canonical();
        let mut tables = Tables::default();
        tables.push(TableId::MODULE, module_row("a.dll")).unwrap();
        tables
            .push(
                TableId::CUSTOM_ATTRIBUTE,
                vec![
                    Cell::index(TableIndex::new(TableId::MODULE, 0)),
                    Cell::index(TableIndex::new(TableId::MEMBER_REF, 0)),
                    Cell::Blob(Blob::Bytes(vec![1, 0, 0, 0])),
                ],
            )
            .unwrap();

        let mut heaps = HeapBuilders::new();
        let mut sections = SectionPartBuilder::new(0x2000);
        let stream = write_tables(&tables, &mut heaps, &mut sections).unwrap();
        let strings = heaps.strings.finish();
        let blob = heaps.blob.finish();
        let guid = heaps.guid.finish();
        let readers = HeapReaders::new(Some(&strings), Some(&blob), Some(&guid)).unwrap();
        let rows_offset = TablesHeader::read(&stream).unwrap().rows_offset;

        // GUID index past the single heap entry
        let mut bad_guid = stream.clone();
        bad_guid[rows_offset + 4] = 9;
        let raw = RawTables::read(&bad_guid, &schema, Vec::new()).unwrap();
        let error = raw.resolve(&readers, schema.clone()).unwrap_err().to_string();
        assert!(error.contains("Module.Mvid of row 1"), "{error}");

        // CustomAttributeType tag 0 is unused
        let mut bad_tag = stream;
        bad_tag[rows_offset + 10 + 2] = 1 << 3;
        let raw = RawTables::read(&bad_tag, &schema, Vec::new()).unwrap();
        let error = raw.resolve(&readers, schema).unwrap_err().to_string();
        assert!(error.contains("CustomAttribute.Type of row 1"), "{error}");
    }

    #[test]
    fn rows_round_trip() {
        let mut tables = Tables::default();
        tables.push(TableId::MODULE, module_row("a.dll")).unwrap();
        let object = tables
            .push(
                TableId::TYPE_REF,
                vec![Cell::Index(None), Cell::str("Object"), Cell::str("System")],
            )
            .unwrap();
        tables
            .push(
                TableId::TYPE_DEF,
                vec![
                    Cell::Int(0x0010_0001),
                    Cell::str("C"),
                    Cell::str("N"),
                    Cell::index(object),
                    Cell::list(TableId::FIELD, 0),
                    Cell::list(TableId::METHOD_DEF, 0),
                ],
            )
            .unwrap();
        let field = tables
            .push(
                TableId::FIELD,
                vec![
                    Cell::Int(0x0051),
                    Cell::str("Answer"),
                    Cell::Blob(Blob::Field(SignatureField {
                        field_type: TypeSignature::I4,
                    })),
                ],
            )
            .unwrap();
        tables
            .push(
                TableId::CONSTANT,
                vec![
                    Cell::Int(0x08),
                    Cell::Int(0),
                    Cell::index(field),
                    Cell::Blob(Blob::Constant(ConstantValue::I4(42))),
                ],
            )
            .unwrap();
        tables
            .push(
                TableId::ASSEMBLY,
                vec![
                    Cell::Int(0x8004),
                    Cell::Int(1),
                    Cell::Int(2),
                    Cell::Int(3),
                    Cell::Int(4),
                    Cell::Int(0),
                    Cell::Blob(Blob::Bytes(Vec::new())),
                    Cell::str("a"),
                    Cell::str(""),
                ],
            )
            .unwrap();

        let read = round_trip(&tables);
        assert_eq!(read, tables);
        let typedef = read.row(TableIndex::new(TableId::TYPE_DEF, 0)).unwrap();
        assert_eq!(typedef.index(columns::typedef::EXTENDS).unwrap(), Some(object));
    }

    #[test]
    fn generation_keeps_sixteen_bits() {
        let mut tables = Tables::default();
        let mut row = module_row("a.dll");
        row[0] = Cell::Int(0x0001_0002);
        tables.push(TableId::MODULE, row).unwrap();

        let read = round_trip(&tables);
        let module = read.row(TableIndex::new(TableId::MODULE, 0)).unwrap();
        assert_eq!(module.int(columns::module::GENERATION).unwrap(), 2);
    }

    #[test]
    fn string_heap_width_boundary() {
        // The heap starts with the empty string; name plus terminator fill it to the size,
        // and the stream rounds that up to a multiple of four
        for (name_len, large) in [(0xFFFA_usize, false), (0xFFFB, true)] {
            let mut tables = Tables::default();
            tables
                .push(TableId::MODULE, module_row(&"x".repeat(name_len)))
                .unwrap();

            let mut heaps = HeapBuilders::new();
            let mut sections = SectionPartBuilder::new(0x2000);
            let stream = write_tables(&tables, &mut heaps, &mut sections).unwrap();
            assert_eq!(heaps.strings.len(), name_len + 2);
            assert_eq!(stream[6] & super::super::HEAP_LARGE_STRINGS != 0, large);
        }
    }

    #[test]
    fn table_index_width_boundary() {
        let schema = SchemaRegistry::canonical();
        let impl_map = schema.descriptor(TableId::IMPL_MAP).unwrap();

        let small = TableInfo::new_test(&[(TableId::MODULE_REF, 0xFFFF)], false, false, false);
        let large = TableInfo::new_test(&[(TableId::MODULE_REF, 0x1_0000)], false, false, false);
        assert_eq!(row_size(impl_map, &small), 2 + 2 + 2 + 2);
        assert_eq!(row_size(impl_map, &large), 2 + 2 + 2 + 4);
    }

    #[test]
    fn blobs_fall_back_to_bytes() {
        assert_eq!(
            parse_blob(BlobKind::FieldSig, &[0x06, 0x08], None),
            Blob::Field(SignatureField {
                field_type: TypeSignature::I4
            })
        );
        // Truncated signature
        assert_eq!(
            parse_blob(BlobKind::FieldSig, &[0x06], None),
            Blob::Bytes(vec![0x06])
        );
        // Non-minimal compressed integers are normalized
        assert_eq!(
            parse_blob(BlobKind::FieldSig, &[0x06, 0x13, 0x80, 0x01], None),
            Blob::Field(SignatureField {
                field_type: TypeSignature::Var(1)
            })
        );
        assert_eq!(
            parse_blob(BlobKind::FieldSig, &[0x06, 0x12, 0x80, 0x05], None),
            Blob::Field(SignatureField {
                field_type: TypeSignature::Class(TableIndex::new(TableId::TYPE_REF, 0))
            })
        );
        assert_eq!(
            parse_blob(BlobKind::CustomAttribute, &[1, 0, 0, 0], None),
            Blob::Bytes(vec![1, 0, 0, 0])
        );
        assert_eq!(
            parse_blob(BlobKind::Constant { element_type_column: 0 }, &[1, 0], Some(0x06)),
            Blob::Constant(ConstantValue::I2(1))
        );
    }

    #[test]
    fn heap_readers_are_used() {
        let strings = [0, b'a', 0];
        let blob = [0, 2, 0x06, 0x08];
        let guid = [0xAB; 16];
        let readers = HeapReaders::new(Some(&strings), Some(&blob), Some(&guid)).unwrap();
        assert_eq!(readers.string(HeapKind::Strings, 1).unwrap(), "a");
        assert!(readers.string(HeapKind::Strings, 3).is_err());
        assert_eq!(readers.string(HeapKind::Custom("#Names"), 0).unwrap(), "");
        assert!(Strings::from(&[]).is_err());
        assert!(BlobHeap::from(&blob).is_ok());
        assert_eq!(GuidHeap::from(&guid).unwrap().count(), 1);
    }
}
