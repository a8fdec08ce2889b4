//! Typed row values.

use crate::{
    metadata::{
        constant::ConstantValue,
        customattributes::CustomAttributeValue,
        marshalling::MarshallingInfo,
        method::MethodBody,
        security::PermissionSet,
        signatures::{
            SignatureField, SignatureLocalVariables, SignatureMethod, SignatureMethodSpec,
            SignatureProperty, TypeSignature,
        },
        tables::{TableId, TableIndex},
    },
    Error, Result,
};

/// Visitor over every table index embedded in a value.
///
/// The merge engine uses it to translate references into the target index space and the
/// table sorter uses it to apply row permutations.
pub trait RemapIndices {
    /// Call `f` on every embedded table index, allowing it to rewrite the index in place.
    ///
    /// # Errors
    /// Propagates the first error returned by `f`.
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()>;
}

/// The content of a blob column.
#[derive(Debug, Clone, PartialEq)]
pub enum Blob {
    /// Opaque bytes, also used for any blob whose parsed form would not re-encode identically
    Bytes(Vec<u8>),
    /// A method or function-pointer signature
    Method(SignatureMethod),
    /// A field signature
    Field(SignatureField),
    /// A property signature
    Property(SignatureProperty),
    /// A local variable signature
    Locals(SignatureLocalVariables),
    /// A type specification
    TypeSpec(TypeSignature),
    /// A generic method instantiation
    MethodSpec(SignatureMethodSpec),
    /// A custom attribute value
    CustomAttribute(CustomAttributeValue),
    /// A marshalling descriptor
    Marshal(MarshallingInfo),
    /// A permission set
    Security(PermissionSet),
    /// A constant value
    Constant(ConstantValue),
}

impl Blob {
    /// Returns the raw bytes if this blob was kept unparsed
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Blob::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl RemapIndices for Blob {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        match self {
            Blob::Bytes(_)
            | Blob::Marshal(_)
            | Blob::Security(_)
            | Blob::Constant(_)
            | Blob::CustomAttribute(_) => Ok(()),
            Blob::Method(signature) => signature.remap_indices(f),
            Blob::Field(signature) => signature.remap_indices(f),
            Blob::Property(signature) => signature.remap_indices(f),
            Blob::Locals(signature) => signature.remap_indices(f),
            Blob::TypeSpec(signature) => signature.remap_indices(f),
            Blob::MethodSpec(signature) => signature.remap_indices(f),
        }
    }
}

/// The content of a raw-data-reference column.
#[derive(Debug, Clone, PartialEq)]
pub enum RawData {
    /// No content (RVA 0: abstract or runtime-provided methods)
    None,
    /// An RVA or offset that has not been (or cannot be) resolved to content; written back as is
    Unresolved(u32),
    /// A decoded method body
    MethodBody(Box<MethodBody>),
    /// Initial data of a field
    FieldData(Vec<u8>),
    /// The bytes of an embedded manifest resource
    Resource(Vec<u8>),
}

impl RemapIndices for RawData {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        match self {
            RawData::MethodBody(body) => body.remap_indices(f),
            _ => Ok(()),
        }
    }
}

/// One typed value of a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A numeric constant
    Int(u32),
    /// A heap string
    Str(String),
    /// A nullable GUID
    Guid(Option<uguid::Guid>),
    /// A blob
    Blob(Blob),
    /// A nullable table index; list columns always hold `Some`
    Index(Option<TableIndex>),
    /// Section content referenced by RVA or offset
    RawData(RawData),
}

impl Cell {
    /// A string cell
    #[must_use]
    pub fn str(value: &str) -> Cell {
        Cell::Str(value.to_string())
    }

    /// A list cell starting at the zero-based `row` of `table`
    #[must_use]
    pub fn list(table: TableId, row: u32) -> Cell {
        Cell::Index(Some(TableIndex::new(table, row)))
    }

    /// A non-null index cell
    #[must_use]
    pub fn index(index: TableIndex) -> Cell {
        Cell::Index(Some(index))
    }
}

impl RemapIndices for Cell {
    fn remap_indices(&mut self, f: &mut dyn FnMut(&mut TableIndex) -> Result<()>) -> Result<()> {
        match self {
            Cell::Index(Some(index)) => f(index),
            Cell::Blob(blob) => blob.remap_indices(f),
            Cell::RawData(data) => data.remap_indices(f),
            _ => Ok(()),
        }
    }
}

/// One row of a table.
///
/// Cells are validated against the table's columns when the row enters a table; afterwards
/// they are only changed through [`crate::metadata::tables::Tables::set`].
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: TableId,
    cells: Vec<Cell>,
}

impl Row {
    pub(crate) fn new(table: TableId, cells: Vec<Cell>) -> Self {
        Row { table, cells }
    }

    /// The table this row belongs to
    #[must_use]
    pub fn table(&self) -> TableId {
        self.table
    }

    /// All cells in column order
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub(crate) fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub(crate) fn into_cells(self) -> Vec<Cell> {
        self.cells
    }

    /// The cell of a column.
    ///
    /// # Errors
    /// Returns an error if the column does not exist.
    pub fn cell(&self, column: usize) -> Result<&Cell> {
        self.cells.get(column).ok_or_else(|| Error::InvalidRow {
            table: self.table,
            message: format!("column {column} does not exist"),
        })
    }

    fn mismatch(&self, column: usize, expected: &str) -> Error {
        Error::InvalidRow {
            table: self.table,
            message: format!("column {column} does not hold {expected}"),
        }
    }

    /// The numeric value of a column.
    ///
    /// # Errors
    /// Returns an error if the column is not numeric.
    pub fn int(&self, column: usize) -> Result<u32> {
        match self.cell(column)? {
            Cell::Int(value) => Ok(*value),
            _ => Err(self.mismatch(column, "an integer")),
        }
    }

    /// The string value of a column.
    ///
    /// # Errors
    /// Returns an error if the column is not a string column.
    pub fn string(&self, column: usize) -> Result<&str> {
        match self.cell(column)? {
            Cell::Str(value) => Ok(value),
            _ => Err(self.mismatch(column, "a string")),
        }
    }

    /// The index value of a column.
    ///
    /// # Errors
    /// Returns an error if the column is not an index column.
    pub fn index(&self, column: usize) -> Result<Option<TableIndex>> {
        match self.cell(column)? {
            Cell::Index(value) => Ok(*value),
            _ => Err(self.mismatch(column, "an index")),
        }
    }

    /// The GUID value of a column.
    ///
    /// # Errors
    /// Returns an error if the column is not a GUID column.
    pub fn guid(&self, column: usize) -> Result<Option<uguid::Guid>> {
        match self.cell(column)? {
            Cell::Guid(value) => Ok(*value),
            _ => Err(self.mismatch(column, "a GUID")),
        }
    }

    /// The blob value of a column.
    ///
    /// # Errors
    /// Returns an error if the column is not a blob column.
    pub fn blob(&self, column: usize) -> Result<&Blob> {
        match self.cell(column)? {
            Cell::Blob(value) => Ok(value),
            _ => Err(self.mismatch(column, "a blob")),
        }
    }

    /// The raw data value of a column.
    ///
    /// # Errors
    /// Returns an error if the column is not a raw-data-reference column.
    pub fn raw_data(&self, column: usize) -> Result<&RawData> {
        match self.cell(column)? {
            Cell::RawData(value) => Ok(value),
            _ => Err(self.mismatch(column, "raw data")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let row = Row::new(
            TableId::FIELD,
            vec![
                Cell::Int(6),
                Cell::str("value__"),
                Cell::Blob(Blob::Bytes(vec![6, 8])),
            ],
        );

        assert_eq!(row.int(0).unwrap(), 6);
        assert_eq!(row.string(1).unwrap(), "value__");
        assert_eq!(row.blob(2).unwrap().as_bytes(), Some(&[6_u8, 8][..]));
        assert!(row.string(0).is_err());
        assert!(row.cell(3).is_err());
    }

    #[test]
    fn remap_reaches_indices() {
        let mut cell = Cell::index(TableIndex::new(TableId::TYPE_DEF, 1));
        cell.remap_indices(&mut |index| {
            index.row += 10;
            Ok(())
        })
        .unwrap();
        assert_eq!(cell, Cell::index(TableIndex::new(TableId::TYPE_DEF, 11)));

        let mut untouched = Cell::Index(None);
        untouched
            .remap_indices(&mut |_| Err(Error::Error("unexpected".to_string())))
            .unwrap();
    }
}
