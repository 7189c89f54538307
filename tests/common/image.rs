//! Byte-built PE images for the loader tests.
//!
//! [`ImageBuilder`] lays out a PE32 DLL with a single `.text` section holding the CLI header,
//! tiny-format method bodies and the metadata root with its `#~`, `#Strings`, `#US`, `#GUID` and
//! `#Blob` streams. Rows are given column by column in the order of
//! [`dotlens::metadata::tables::schema::columns`], with coded index columns passed as full token
//! values. All heaps and tables stay small, so every index column is two bytes wide.

use std::collections::{BTreeMap, HashMap};

use dotlens::metadata::{
    tables::{
        schema::{self, Column},
        TableId,
    },
    token::Token,
};

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: usize = 0x2000;
const TEXT_RVA: usize = 0x2000;
const PE_OFFSET: usize = 0x80;
const CLI_HEADER_SIZE: usize = 72;

fn align(value: usize, to: usize) -> usize {
    (value + to - 1) & !(to - 1)
}

fn pad(data: &mut Vec<u8>, to: usize) {
    data.resize(align(data.len(), to), 0);
}

fn put_u16(data: &mut Vec<u8>, value: u16) {
    data.extend_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut Vec<u8>, value: u32) {
    data.extend_from_slice(&value.to_le_bytes());
}

fn compressed(data: &mut Vec<u8>, len: usize) {
    match len {
        0..=0x7F => data.push(len as u8),
        0x80..=0x3FFF => data.extend_from_slice(&(0x8000 | len as u16).to_be_bytes()),
        _ => data.extend_from_slice(&(0xC000_0000 | len as u32).to_be_bytes()),
    }
}

/// Assembles the heaps, tables and bodies of one image.
pub struct ImageBuilder {
    strings: Vec<u8>,
    interned: HashMap<String, u32>,
    blobs: Vec<u8>,
    guids: Vec<u8>,
    user_strings: Vec<u8>,
    bodies: Vec<u8>,
    tables: BTreeMap<u8, (TableId, Vec<Vec<u32>>)>,
}

impl Default for ImageBuilder {
    fn default() -> Self {
        ImageBuilder {
            strings: vec![0],
            interned: HashMap::new(),
            blobs: vec![0],
            guids: Vec::new(),
            user_strings: vec![0],
            bodies: Vec::new(),
            tables: BTreeMap::new(),
        }
    }
}

impl ImageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `#Strings` offset of `value`, 0 for the empty string
    pub fn string(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(offset) = self.interned.get(value) {
            return *offset;
        }

        let offset = self.strings.len() as u32;
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        self.interned.insert(value.to_string(), offset);
        offset
    }

    /// `#Blob` offset of `value`
    pub fn blob(&mut self, value: &[u8]) -> u32 {
        if value.is_empty() {
            return 0;
        }

        let offset = self.blobs.len() as u32;
        compressed(&mut self.blobs, value.len());
        self.blobs.extend_from_slice(value);
        offset
    }

    /// 1-based `#GUID` index of `value`
    pub fn guid(&mut self, value: [u8; 16]) -> u32 {
        self.guids.extend_from_slice(&value);
        (self.guids.len() / 16) as u32
    }

    /// `ldstr` token of a user string literal
    pub fn user_string(&mut self, value: &str) -> Token {
        let offset = self.user_strings.len() as u32;
        let units: Vec<u16> = value.encode_utf16().collect();
        compressed(&mut self.user_strings, units.len() * 2 + 1);
        for unit in units {
            self.user_strings.extend_from_slice(&unit.to_le_bytes());
        }
        self.user_strings.push(0);
        Token::new(0x7000_0000 | offset)
    }

    /// RVA of a tiny-format body holding `code`
    pub fn body(&mut self, code: &[u8]) -> u32 {
        assert!(code.len() < 64, "tiny bodies hold at most 63 bytes of IL");
        pad(&mut self.bodies, 4);
        let rva = TEXT_RVA + CLI_HEADER_SIZE + self.bodies.len();
        self.bodies.push(((code.len() as u8) << 2) | 0x2);
        self.bodies.extend_from_slice(code);
        rva as u32
    }

    /// Appends a row to `table` and returns its token
    pub fn row(&mut self, table: TableId, values: &[u32]) -> Token {
        assert_eq!(
            values.len(),
            schema::columns(table).len(),
            "{table:?} row has the wrong column count"
        );
        let rows = &mut self.tables.entry(table as u8).or_insert((table, Vec::new())).1;
        rows.push(values.to_vec());
        table.token(rows.len() as u32)
    }

    /// Overwrites one column of an existing row
    pub fn set(&mut self, table: TableId, rid: u32, column: usize, value: u32) {
        let rows = &mut self
            .tables
            .get_mut(&(table as u8))
            .expect("table has rows")
            .1;
        rows[rid as usize - 1][column] = value;
    }

    fn encode(column: &Column, value: u32, out: &mut Vec<u8>) {
        match column {
            Column::U32 => put_u32(out, value),
            Column::Coded(coded) => {
                let token = Token::new(value);
                let encoded = if token.is_null() {
                    0
                } else {
                    let tag = coded
                        .tables()
                        .iter()
                        .position(|table| *table as u8 == token.table())
                        .expect("token table belongs to the coded index");
                    (token.row() << coded.tag_bits()) | tag as u32
                };
                put_u16(out, encoded as u16);
            }
            _ => put_u16(out, value as u16),
        }
    }

    fn table_stream(&self) -> Vec<u8> {
        let mut data = Vec::new();
        put_u32(&mut data, 0);
        data.extend_from_slice(&[2, 0, 0, 1]);

        let valid = self
            .tables
            .keys()
            .fold(0u64, |valid, table| valid | (1u64 << *table));
        data.extend_from_slice(&valid.to_le_bytes());
        data.extend_from_slice(&0u64.to_le_bytes());

        for (_, rows) in self.tables.values() {
            put_u32(&mut data, rows.len() as u32);
        }
        for (table, rows) in self.tables.values() {
            for row in rows {
                for (column, value) in schema::columns(*table).iter().zip(row) {
                    Self::encode(column, *value, &mut data);
                }
            }
        }

        pad(&mut data, 4);
        data
    }

    fn metadata(&self) -> Vec<u8> {
        let mut streams = [
            ("#~", self.table_stream()),
            ("#Strings", self.strings.clone()),
            ("#US", self.user_strings.clone()),
            ("#GUID", self.guids.clone()),
            ("#Blob", self.blobs.clone()),
        ];
        for (_, data) in &mut streams {
            pad(data, 4);
        }

        let version = b"v4.0.30319\0\0";
        let directory_len: usize = streams
            .iter()
            .map(|(name, _)| 8 + align(name.len() + 1, 4))
            .sum();

        let mut root = Vec::new();
        put_u32(&mut root, 0x424A_5342);
        put_u16(&mut root, 1);
        put_u16(&mut root, 1);
        put_u32(&mut root, 0);
        put_u32(&mut root, version.len() as u32);
        root.extend_from_slice(version);
        put_u16(&mut root, 0);
        put_u16(&mut root, streams.len() as u16);

        let mut offset = root.len() + directory_len;
        for (name, data) in &streams {
            put_u32(&mut root, offset as u32);
            put_u32(&mut root, data.len() as u32);
            root.extend_from_slice(name.as_bytes());
            root.push(0);
            pad(&mut root, 4);
            offset += data.len();
        }
        for (_, data) in &streams {
            root.extend_from_slice(data);
        }

        root
    }

    /// Lays out the PE file
    pub fn build(&self) -> Vec<u8> {
        let mut bodies = self.bodies.clone();
        pad(&mut bodies, 4);
        let metadata = self.metadata();
        let metadata_rva = TEXT_RVA + CLI_HEADER_SIZE + bodies.len();

        let mut text = Vec::new();
        put_u32(&mut text, CLI_HEADER_SIZE as u32);
        put_u16(&mut text, 2);
        put_u16(&mut text, 5);
        put_u32(&mut text, metadata_rva as u32);
        put_u32(&mut text, metadata.len() as u32);
        // IL only
        put_u32(&mut text, 1);
        put_u32(&mut text, 0);
        text.resize(CLI_HEADER_SIZE, 0);
        text.extend_from_slice(&bodies);
        text.extend_from_slice(&metadata);

        let raw_size = align(text.len(), FILE_ALIGNMENT);
        let image_size = align(TEXT_RVA + text.len(), SECTION_ALIGNMENT);

        let mut image = vec![0u8; PE_OFFSET];
        image[0..2].copy_from_slice(b"MZ");
        image[0x3C..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());

        image.extend_from_slice(b"PE\0\0");
        // COFF header: i386, one section, PE32 optional header, executable 32-bit DLL
        put_u16(&mut image, 0x014C);
        put_u16(&mut image, 1);
        put_u32(&mut image, 0);
        put_u32(&mut image, 0);
        put_u32(&mut image, 0);
        put_u16(&mut image, 0xE0);
        put_u16(&mut image, 0x2102);

        // standard fields
        put_u16(&mut image, 0x010B);
        image.extend_from_slice(&[8, 0]);
        put_u32(&mut image, raw_size as u32);
        put_u32(&mut image, 0);
        put_u32(&mut image, 0);
        put_u32(&mut image, 0);
        put_u32(&mut image, TEXT_RVA as u32);
        put_u32(&mut image, 0);

        // windows fields
        put_u32(&mut image, 0x0040_0000);
        put_u32(&mut image, SECTION_ALIGNMENT as u32);
        put_u32(&mut image, FILE_ALIGNMENT as u32);
        for version in [4u16, 0, 0, 0, 4, 0] {
            put_u16(&mut image, version);
        }
        put_u32(&mut image, 0);
        put_u32(&mut image, image_size as u32);
        put_u32(&mut image, FILE_ALIGNMENT as u32);
        put_u32(&mut image, 0);
        put_u16(&mut image, 3);
        put_u16(&mut image, 0x8540);
        for size in [0x0010_0000u32, 0x1000, 0x0010_0000, 0x1000] {
            put_u32(&mut image, size);
        }
        put_u32(&mut image, 0);
        put_u32(&mut image, 16);

        // data directories, only the CLI header (index 14) is present
        for index in 0..16 {
            if index == 14 {
                put_u32(&mut image, TEXT_RVA as u32);
                put_u32(&mut image, CLI_HEADER_SIZE as u32);
            } else {
                put_u32(&mut image, 0);
                put_u32(&mut image, 0);
            }
        }

        image.extend_from_slice(b".text\0\0\0");
        put_u32(&mut image, text.len() as u32);
        put_u32(&mut image, TEXT_RVA as u32);
        put_u32(&mut image, raw_size as u32);
        put_u32(&mut image, FILE_ALIGNMENT as u32);
        put_u32(&mut image, 0);
        put_u32(&mut image, 0);
        put_u16(&mut image, 0);
        put_u16(&mut image, 0);
        put_u32(&mut image, 0x6000_0020);

        image.resize(FILE_ALIGNMENT, 0);
        image.extend_from_slice(&text);
        image.resize(FILE_ALIGNMENT + raw_size, 0);
        image
    }
}

/// Tokens of the inventory image
pub struct Inventory {
    pub image: ImageBuilder,
    pub warehouse: Token,
    pub bin: Token,
    pub store: Token,
}

/// A small assembly written the way a compiler lays it out:
///
/// ```text
/// namespace Inventory {
///     public class Warehouse {
///         private int _capacity;
///         public void Store(string item, int count) { _capacity = count; }
///         public int Capacity { get { return _capacity; } }
///         public Warehouse() : base() { }
///         public class Bin { public string Label() { return "north aisle"; } }
///     }
/// }
/// ```
pub fn inventory(revision: u16) -> Inventory {
    let mut image = ImageBuilder::new();

    let module_name = image.string("Inventory.dll");
    let mvid = image.guid([
        0x3D, 0x6B, 0x1C, 0x2A, 0x44, 0x90, 0x4E, 0x1F, 0x8A, 0x51, 0x07, 0xC2, 0x9B, 0x3E, 0x60,
        0xD4,
    ]);
    image.row(TableId::Module, &[0, module_name, mvid, 0, 0]);

    let runtime = image.string("System.Runtime");
    let assembly_ref = image.row(TableId::AssemblyRef, &[8, 0, 0, 0, 0, 0, runtime, 0, 0]);

    let object = image.string("Object");
    let system = image.string("System");
    let object = image.row(TableId::TypeRef, &[assembly_ref.value(), object, system]);

    let module_type = image.string("<Module>");
    image.row(TableId::TypeDef, &[0, module_type, 0, 0, 1, 1]);

    let name = image.string("Warehouse");
    let namespace = image.string("Inventory");
    // public beforefieldinit
    let warehouse = image.row(
        TableId::TypeDef,
        &[0x0010_0001, name, namespace, object.value(), 1, 1],
    );

    let name = image.string("Bin");
    // nested public beforefieldinit
    let bin = image.row(TableId::TypeDef, &[0x0010_0002, name, 0, object.value(), 2, 4]);

    let name = image.string("_capacity");
    let int32 = image.blob(&[0x06, 0x08]);
    let capacity = image.row(TableId::Field, &[0x0001, name, int32]);
    let field = capacity.value().to_le_bytes();

    let object_ctor = image.string(".ctor");
    let void_instance = image.blob(&[0x20, 0x00, 0x01]);
    let base_ctor = image.row(TableId::MemberRef, &[object.value(), object_ctor, void_instance]);
    let base_ctor = base_ctor.value().to_le_bytes();

    // ldarg.0 ldarg.2 stfld _capacity ret
    let store_body = image.body(&[0x02, 0x04, 0x7D, field[0], field[1], field[2], field[3], 0x2A]);
    let name = image.string("Store");
    let signature = image.blob(&[0x20, 0x02, 0x01, 0x0E, 0x08]);
    let store = image.row(TableId::MethodDef, &[store_body, 0, 0x0086, name, signature, 1]);

    // ldarg.0 ldfld _capacity ret
    let getter_body = image.body(&[0x02, 0x7B, field[0], field[1], field[2], field[3], 0x2A]);
    let name = image.string("get_Capacity");
    let signature = image.blob(&[0x20, 0x00, 0x08]);
    let getter = image.row(TableId::MethodDef, &[getter_body, 0, 0x0886, name, signature, 3]);

    // ldarg.0 call object::.ctor ret
    let ctor_body = image.body(&[
        0x02, 0x28, base_ctor[0], base_ctor[1], base_ctor[2], base_ctor[3], 0x2A,
    ]);
    image.row(TableId::MethodDef, &[ctor_body, 0, 0x1886, object_ctor, void_instance, 3]);

    let literal = image.user_string("north aisle").value().to_le_bytes();
    // ldstr "north aisle" ret
    let label_body = image.body(&[0x72, literal[0], literal[1], literal[2], literal[3], 0x2A]);
    let name = image.string("Label");
    let signature = image.blob(&[0x20, 0x00, 0x0E]);
    image.row(TableId::MethodDef, &[label_body, 0, 0x0086, name, signature, 3]);

    let name = image.string("item");
    image.row(TableId::Param, &[0, 1, name]);
    let name = image.string("count");
    image.row(TableId::Param, &[0, 2, name]);

    image.row(TableId::PropertyMap, &[warehouse.row(), 1]);
    let name = image.string("Capacity");
    let signature = image.blob(&[0x28, 0x00, 0x08]);
    let property = image.row(TableId::Property, &[0, name, signature]);
    // getter
    image.row(TableId::MethodSemantics, &[0x0002, getter.row(), property.value()]);

    image.row(TableId::NestedClass, &[bin.row(), warehouse.row()]);

    let name = image.string("Inventory");
    image.row(TableId::Assembly, &[0x8004, 1, 2, 3, u32::from(revision), 0, 0, name, 0]);

    Inventory {
        image,
        warehouse,
        bin,
        store,
    }
}
