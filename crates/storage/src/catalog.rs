//! Table catalog on top of the storage engine.
//!
//! Two system trees hold the schema: table descriptors keyed by table name,
//! and column descriptors keyed by `"{table}_{column}"`. Their roots live in
//! the [`DatabaseHeader`]. Every user table has its own row tree keyed by
//! the table's first column, with rows stored as encoded byte strings.
//!
//! Trees report root changes through a shared log that the catalog drains
//! after each operation, once the tree has released the pager.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::btree::RootListener;
use crate::codec::{BytesCodec, Codec, StringCodec};
use crate::config::{validate_degree, DEFAULT_BTREE_DEGREE};
use crate::error::{Result, StorageError};
use crate::header::DatabaseHeader;
use crate::pager::{PageId, Pager};
use crate::persisted::{allocate_empty_root, PersistedBPlusTree};
use crate::schema::{
    ColumnInfo, ColumnInfoCodec, Row, RowCodec, TableInfo, TableInfoCodec, Value, ValueCodec,
};

/// Name under which the table-descriptor tree reports root changes.
pub const TABLES_TREE: &str = "__tables";
/// Name under which the column-descriptor tree reports root changes.
pub const COLUMNS_TREE: &str = "__columns";

type RootLog = Rc<RefCell<Vec<(String, PageId)>>>;

pub struct Catalog {
    pager: Pager,
    header: DatabaseHeader,
    degree: usize,
    root_log: RootLog,
}

impl Catalog {
    pub fn open(pager: Pager) -> Result<Self> {
        Self::with_degree(pager, DEFAULT_BTREE_DEGREE)
    }

    /// Open with a specific B+tree degree for every tree the catalog touches.
    pub fn with_degree(mut pager: Pager, degree: usize) -> Result<Self> {
        validate_degree(degree)?;
        let header = DatabaseHeader::load(&mut pager)?;
        Ok(Self {
            pager,
            header,
            degree,
            root_log: RootLog::default(),
        })
    }

    pub fn header(&self) -> DatabaseHeader {
        self.header
    }

    pub fn pager_mut(&mut self) -> &mut Pager {
        &mut self.pager
    }

    pub fn into_pager(self) -> Pager {
        self.pager
    }

    /// Flush everything and close the underlying pager.
    pub fn close(self) -> Result<()> {
        self.pager.close()
    }

    pub fn create_table(&mut self, name: &str, columns: Vec<ColumnInfo>) -> Result<TableInfo> {
        if name == TABLES_TREE || name == COLUMNS_TREE || self.get_table(name)?.is_some() {
            return Err(StorageError::TableExists(name.to_string()));
        }

        let root_page = allocate_empty_root(&mut self.pager)?;
        let table = TableInfo::new(name, columns, root_page);

        self.tables()?.insert(name.to_string(), table.clone())?;
        self.apply_root_changes()?;

        {
            let mut column_tree = self.columns()?;
            for column in &table.columns {
                column_tree.insert(column_key(name, &column.name), column.clone())?;
            }
        }
        self.apply_root_changes()?;

        debug!(table = name, root_page, "created table");
        Ok(table)
    }

    pub fn get_table(&mut self, name: &str) -> Result<Option<TableInfo>> {
        let table = self.tables()?.search(&name.to_string())?;
        self.apply_root_changes()?;
        Ok(table)
    }

    /// All tables in name order.
    pub fn list_tables(&mut self) -> Result<Vec<TableInfo>> {
        let tables = self.tables()?.values()?.collect::<Result<Vec<_>>>()?;
        self.apply_root_changes()?;
        Ok(tables)
    }

    /// Column descriptor as stored in the column tree.
    pub fn get_column(&mut self, table: &str, column: &str) -> Result<Option<ColumnInfo>> {
        let info = self.columns()?.search(&column_key(table, column))?;
        self.apply_root_changes()?;
        Ok(info)
    }

    /// Remove a table's descriptors. Returns `false` when the table did not
    /// exist and `if_exists` is set. The row tree's pages are not reclaimed.
    pub fn drop_table(&mut self, name: &str, if_exists: bool) -> Result<bool> {
        let Some(table) = self.get_table(name)? else {
            if if_exists {
                return Ok(false);
            }
            return Err(StorageError::TableNotFound(name.to_string()));
        };

        self.tables()?.delete(&name.to_string())?;
        {
            let mut column_tree = self.columns()?;
            for column in &table.columns {
                column_tree.delete(&column_key(name, &column.name))?;
            }
        }
        self.apply_root_changes()?;

        debug!(table = name, "dropped table");
        Ok(true)
    }

    pub fn insert_row(&mut self, table_name: &str, row: &Row) -> Result<()> {
        let table = self.require_table(table_name)?;
        let key_column = primary_key(&table)?;
        let key = match row.get(&key_column.name) {
            Some(Some(value)) => value.clone(),
            _ => return Err(StorageError::MissingColumn(key_column.name.clone())),
        };
        let bytes = RowCodec::new(&table).encode(row)?;

        self.row_tree(&table)?.insert(key, bytes)?;
        self.apply_root_changes()
    }

    /// Look a row up by its first-column value.
    pub fn find_row(&mut self, table_name: &str, key: &Value) -> Result<Option<Row>> {
        let table = self.require_table(table_name)?;
        let key_column = primary_key(&table)?;
        if key.data_type() != key_column.data_type {
            return Err(StorageError::TypeMismatch {
                column: key_column.name.clone(),
                expected: key_column.data_type.name(),
                found: key.data_type().name(),
            });
        }

        let bytes = self.row_tree(&table)?.search(key)?;
        self.apply_root_changes()?;
        bytes
            .map(|bytes| RowCodec::new(&table).decode(&bytes))
            .transpose()
    }

    /// Every row in key order.
    pub fn scan_rows(&mut self, table_name: &str) -> Result<Vec<Row>> {
        let table = self.require_table(table_name)?;
        let encoded = self
            .row_tree(&table)?
            .values()?
            .collect::<Result<Vec<_>>>()?;
        self.apply_root_changes()?;

        let codec = RowCodec::new(&table);
        encoded.iter().map(|bytes| codec.decode(bytes)).collect()
    }

    /// Record that the tree named `tree_name` now starts at `new_root`.
    ///
    /// System trees update the header on page 0; user tables get their
    /// descriptor replaced.
    pub fn update_root_page_id(&mut self, tree_name: &str, new_root: PageId) -> Result<()> {
        match tree_name {
            TABLES_TREE => {
                self.header.tables_root = new_root;
                self.header.save(&mut self.pager)?;
            }
            COLUMNS_TREE => {
                self.header.columns_root = new_root;
                self.header.save(&mut self.pager)?;
            }
            _ => {
                let mut table = self.require_table(tree_name)?;
                table.root_page = new_root;
                {
                    let mut tables = self.tables()?;
                    tables.delete(&table.name)?;
                    tables.insert(table.name.clone(), table)?;
                }
                self.apply_root_changes()?;
            }
        }
        debug!(tree = tree_name, root = new_root, "updated root page");
        Ok(())
    }

    fn require_table(&mut self, name: &str) -> Result<TableInfo> {
        self.get_table(name)?
            .ok_or_else(|| StorageError::TableNotFound(name.to_string()))
    }

    fn apply_root_changes(&mut self) -> Result<()> {
        let changes: Vec<_> = self.root_log.borrow_mut().drain(..).collect();
        for (tree_name, new_root) in changes {
            self.update_root_page_id(&tree_name, new_root)?;
        }
        Ok(())
    }

    fn root_listener(&self) -> impl RootListener + 'static {
        let log = Rc::clone(&self.root_log);
        move |tree_name: &str, new_root: PageId| {
            log.borrow_mut().push((tree_name.to_string(), new_root));
        }
    }

    fn tables(&mut self) -> Result<PersistedBPlusTree<'_, StringCodec, TableInfoCodec>> {
        let listener = self.root_listener();
        PersistedBPlusTree::open_with_listener(
            &mut self.pager,
            StringCodec,
            TableInfoCodec,
            self.header.tables_root,
            self.degree,
            TABLES_TREE,
            listener,
        )
    }

    fn columns(&mut self) -> Result<PersistedBPlusTree<'_, StringCodec, ColumnInfoCodec>> {
        let listener = self.root_listener();
        PersistedBPlusTree::open_with_listener(
            &mut self.pager,
            StringCodec,
            ColumnInfoCodec,
            self.header.columns_root,
            self.degree,
            COLUMNS_TREE,
            listener,
        )
    }

    fn row_tree(
        &mut self,
        table: &TableInfo,
    ) -> Result<PersistedBPlusTree<'_, ValueCodec, BytesCodec>> {
        let key_codec = ValueCodec::for_column(primary_key(table)?);
        let listener = self.root_listener();
        PersistedBPlusTree::open_with_listener(
            &mut self.pager,
            key_codec,
            BytesCodec,
            table.root_page,
            self.degree,
            table.name.clone(),
            listener,
        )
    }
}

fn column_key(table: &str, column: &str) -> String {
    format!("{table}_{column}")
}

fn primary_key(table: &TableInfo) -> Result<&ColumnInfo> {
    table
        .primary_key()
        .ok_or_else(|| StorageError::MissingColumn(format!("{} has no columns", table.name)))
}
