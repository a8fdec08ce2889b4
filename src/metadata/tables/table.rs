//! Tables and the full table set of a module.

use std::sync::Arc;

use crate::{
    metadata::tables::{
        Cell, ColumnCodec, Permutation, RemapIndices, Row, SchemaRegistry, TableDescriptor,
        TableId, TableIndex,
    },
    Error, Result,
};

/// An ordered sequence of rows of one table kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    id: TableId,
    rows: Vec<Row>,
}

impl Table {
    fn new(id: TableId) -> Self {
        Table {
            id,
            rows: Vec::new(),
        }
    }

    /// The table kind
    #[must_use]
    pub fn id(&self) -> TableId {
        self.id
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows as written into the row count header
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.rows.len() as u32
    }

    /// The rows in order
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// A row by zero-based position
    #[must_use]
    pub fn get(&self, row: u32) -> Option<&Row> {
        self.rows.get(row as usize)
    }

    /// Iterate over `(index, row)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (TableIndex, &Row)> {
        let id = self.id;
        self.rows
            .iter()
            .enumerate()
            .map(move |(position, row)| (TableIndex::new(id, position as u32), row))
    }
}

/// All tables of one module together with the schema they follow.
#[derive(Debug, Clone)]
pub struct Tables {
    schema: Arc<SchemaRegistry>,
    tables: Vec<Table>,
}

impl PartialEq for Tables {
    fn eq(&self, other: &Self) -> bool {
        self.tables == other.tables
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self::new(SchemaRegistry::canonical())
    }
}

impl Tables {
    /// An empty table set following `schema`
    #[must_use]
    pub fn new(schema: Arc<SchemaRegistry>) -> Self {
        Tables {
            schema,
            tables: TableId::all().map(Table::new).collect(),
        }
    }

    /// The schema registry of this table set
    #[must_use]
    pub fn schema(&self) -> &Arc<SchemaRegistry> {
        &self.schema
    }

    /// The descriptor of a table kind.
    ///
    /// # Errors
    /// Returns [`Error::MissingSchema`] if the kind is not registered.
    pub fn descriptor(&self, id: TableId) -> Result<&TableDescriptor> {
        self.schema.descriptor(id)
    }

    /// A table by kind
    #[must_use]
    pub fn table(&self, id: TableId) -> &Table {
        &self.tables[id.index()]
    }

    /// Number of rows of a table
    #[must_use]
    pub fn len(&self, id: TableId) -> usize {
        self.table(id).len()
    }

    /// Row counts of all tables, indexed by kind
    #[must_use]
    pub fn row_counts(&self) -> [u32; 64] {
        let mut counts = [0_u32; 64];
        for table in &self.tables {
            counts[table.id.index()] = table.row_count();
        }
        counts
    }

    /// Tables that hold at least one row, in kind order
    pub fn present(&self) -> impl Iterator<Item = &Table> {
        self.tables.iter().filter(|table| !table.is_empty())
    }

    /// A row by index.
    ///
    /// # Errors
    /// Returns [`Error::IndexOutOfRange`] if the row does not exist.
    pub fn row(&self, index: TableIndex) -> Result<&Row> {
        self.table(index.table)
            .get(index.row)
            .ok_or(Error::IndexOutOfRange(index))
    }

    /// Append a row, validating its cells against the table's columns.
    ///
    /// # Errors
    /// Returns [`Error::MissingSchema`] or [`Error::InvalidRow`] on a schema mismatch.
    pub fn push(&mut self, id: TableId, cells: Vec<Cell>) -> Result<TableIndex> {
        self.schema.descriptor(id)?.check_cells(&cells)?;
        Ok(self.push_unchecked(id, cells))
    }

    pub(crate) fn push_unchecked(&mut self, id: TableId, cells: Vec<Cell>) -> TableIndex {
        let table = &mut self.tables[id.index()];
        let index = TableIndex::new(id, table.row_count());
        table.rows.push(Row::new(id, cells));
        index
    }

    /// Replace the cell of one column.
    ///
    /// # Errors
    /// Returns an error if the row does not exist or the cell does not fit the column.
    pub fn set(&mut self, index: TableIndex, column: usize, cell: Cell) -> Result<()> {
        let descriptor = self.schema.descriptor(index.table)?;
        let Some(codec) = descriptor.columns.get(column).map(|c| c.codec) else {
            return Err(Error::InvalidRow {
                table: index.table,
                message: format!("column {column} does not exist"),
            });
        };

        codec.check(&cell).map_err(|message| Error::InvalidRow {
            table: index.table,
            message,
        })?;

        let row = self.tables[index.table.index()]
            .rows
            .get_mut(index.row as usize)
            .ok_or(Error::IndexOutOfRange(index))?;
        row.cells_mut()[column] = cell;
        Ok(())
    }

    pub(crate) fn rows_mut(&mut self, id: TableId) -> &mut Vec<Row> {
        &mut self.tables[id.index()].rows
    }

    pub(crate) fn row_mut(&mut self, index: TableIndex) -> Result<&mut Row> {
        self.tables[index.table.index()]
            .rows
            .get_mut(index.row as usize)
            .ok_or(Error::IndexOutOfRange(index))
    }

    /// The contiguous run `[start, end)` of `list_table` owned by `owner` through its list
    /// column.
    ///
    /// The run ends where the next row's list starts, or at the end of the listed table.
    ///
    /// # Errors
    /// Returns an error if `owner` does not exist or the column is not a list column.
    pub fn list_range(&self, owner: TableIndex, column: usize) -> Result<(u32, u32)> {
        let table = self.table(owner.table);
        let row = self.row(owner)?;
        let Some(start) = row.index(column)? else {
            return Err(Error::InvalidRow {
                table: owner.table,
                message: format!("list column {column} is null"),
            });
        };

        let listed = self.len(start.table) as u32;
        let end = match table.get(owner.row + 1) {
            Some(next) => next
                .index(column)?
                .map_or(listed, |next_start| next_start.row),
            None => listed,
        };

        Ok((start.row.min(listed), end.min(listed).max(start.row.min(listed))))
    }

    /// Check that every reference names an existing row and every list start lies within
    /// its table (one past the end is allowed).
    ///
    /// # Errors
    /// Returns a format error naming the table, column and row of the first bad reference.
    pub fn validate(&self) -> Result<()> {
        for table in self.present() {
            let descriptor = self.schema.descriptor(table.id)?;
            for (index, row) in table.iter() {
                for (column, descriptor) in descriptor.columns.iter().enumerate() {
                    let Cell::Index(Some(target)) = row.cell(column)? else {
                        continue;
                    };

                    let limit = self.len(target.table) as u32;
                    let valid = match descriptor.codec {
                        ColumnCodec::TableList(_) => target.row <= limit,
                        _ => target.row < limit,
                    };

                    if !valid {
                        return Err(malformed_error!(
                            "{}.{} of row {} references {} which does not exist",
                            table.id,
                            descriptor.name,
                            index.row + 1,
                            target
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// Sort every table that must be sorted and optionally drop exact duplicate rows of
    /// tables that permit it.
    ///
    /// Tables are sorted so that a table reordered later never invalidates the order of one
    /// sorted earlier. After each table is reordered, every reference to it in every table
    /// is rewritten. The returned permutation maps old indices to new ones; a dropped
    /// duplicate maps to the row it duplicated.
    ///
    /// # Errors
    /// Returns an error if a sort key cannot be computed.
    pub fn reorder_sorted(&mut self, dedup: bool) -> Result<Permutation> {
        let mut permutation = Permutation::default();

        for id in self.schema.sort_order() {
            if self.table(id).is_empty() {
                continue;
            }

            let descriptor = self.schema.descriptor(id)?.clone();
            let rows = std::mem::take(self.rows_mut(id));

            let mut keyed = rows
                .into_iter()
                .enumerate()
                .map(|(position, row)| Ok((descriptor.sort_key(&row)?, position, row)))
                .collect::<Result<Vec<_>>>()?;
            keyed.sort_by(|left, right| left.0.cmp(&right.0).then(left.1.cmp(&right.1)));

            let mut map = vec![0_u32; keyed.len()];
            let mut sorted: Vec<Row> = Vec::with_capacity(keyed.len());
            // Start of the run of kept rows sharing the current sort key
            let mut group_start = 0;
            let mut group_key: Option<Vec<u64>> = None;
            for (key, old_position, row) in keyed {
                if group_key.as_ref() != Some(&key) {
                    group_start = sorted.len();
                    group_key = Some(key);
                }

                if dedup && descriptor.dedup {
                    if let Some(existing) = sorted[group_start..].iter().position(|kept| *kept == row)
                    {
                        map[old_position] = (group_start + existing) as u32;
                        continue;
                    }
                }

                map[old_position] = sorted.len() as u32;
                sorted.push(row);
            }

            *self.rows_mut(id) = sorted;

            let table_permutation = Permutation::single(id, map);
            if !table_permutation.is_identity() {
                self.apply_permutation(&table_permutation)?;
            }
            permutation.insert(id, table_permutation.into_map(id));
        }

        Ok(permutation)
    }

    /// Rewrite every non-list reference in every table through `permutation`.
    ///
    /// # Errors
    /// Returns an error if a row's cells do not match its schema.
    pub fn apply_permutation(&mut self, permutation: &Permutation) -> Result<()> {
        let schema = self.schema.clone();
        for table in &mut self.tables {
            if table.rows.is_empty() {
                continue;
            }

            let descriptor = schema.descriptor(table.id)?;
            for row in &mut table.rows {
                for (column, cell) in row.cells_mut().iter_mut().enumerate() {
                    if matches!(
                        descriptor.columns.get(column).map(|c| c.codec),
                        Some(ColumnCodec::TableList(_))
                    ) {
                        continue;
                    }

                    cell.remap_indices(&mut |index| {
                        *index = permutation.map(*index);
                        Ok(())
                    })?;
                }
            }
        }

        Ok(())
    }
}
