//! Builds an [`Assembly`] from a PE image.
//!
//! The loader walks the metadata tables in dependency order and feeds every row into an
//! [`AssemblyBuilder`], so the tokens the builder assigns are the tokens of the image. Member
//! lists (`TypeDef.FieldList`, `TypeDef.MethodList`, `PropertyMap`, `EventMap`) must therefore
//! be contiguous and ascending, which ECMA-335 requires of the compressed `#~` format; images
//! using the uncompressed `#-` format are rejected as not supported.
//!
//! Method rows are decoded in parallel on the rayon pool, since that is where the per-row work
//! (signature parsing and body slicing) is. A method body that cannot be parsed is logged and
//! dropped instead of failing the load.

mod data;

use std::{path::Path, sync::Arc};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    file::File,
    metadata::{
        body::MethodBody,
        signatures::{
            parse_field_signature, parse_method_signature, parse_method_spec_signature,
            parse_property_signature, parse_type_spec_signature, SignatureMethod,
            SignatureMethodSpec, SignatureProperty, TypeSignature,
        },
        streams::UserStrings,
        symbols::{Assembly, AssemblyBuilder, AssemblyVersion, MemberRefSignature},
        tables::TableId,
        token::Token,
    },
    Result,
};
use data::LoaderData;

/// Method impl code type `runtime`: no IL body
const METHOD_IMPL_RUNTIME: u16 = 0x0003;

struct MethodRow {
    name: String,
    flags: u16,
    impl_flags: u16,
    signature: SignatureMethod,
    body: Option<Arc<[u8]>>,
    param_start: u32,
}

/// Loads the assembly at `path`.
///
/// # Errors
/// Returns an error if the file cannot be read or its metadata is malformed.
pub fn load_file(path: &Path) -> Result<Assembly> {
    let file = File::from_file(path)?;
    load(&file)
}

/// Loads an assembly image held in memory.
///
/// # Errors
/// Returns an error if the image or its metadata is malformed.
pub fn load_bytes(data: Vec<u8>) -> Result<Assembly> {
    let file = File::from_mem(data)?;
    load(&file)
}

fn load(file: &File) -> Result<Assembly> {
    let data = LoaderData::new(file)?;
    let tables = &data.tables;

    if tables.rows(TableId::Module) == 0 {
        return Err(malformed_error!("Module table is empty"));
    }
    let module = tables.row(TableId::Module, 1)?;
    let module_name = data.string(module.get(1))?;

    let (name, version) = if tables.rows(TableId::Assembly) > 0 {
        let row = tables.row(TableId::Assembly, 1)?;
        (data.string(row.get(7))?, version_of(&row, 1))
    } else {
        let stem = Path::new(&module_name)
            .file_stem()
            .map_or_else(|| module_name.clone(), |stem| stem.to_string_lossy().into_owned());
        (stem, AssemblyVersion::default())
    };

    let mut builder = AssemblyBuilder::new(&name);
    builder
        .set_module_name(&module_name)
        .set_mvid(data.guid(module.get(2))?)
        .set_version(version);

    load_references(&data, &mut builder)?;
    load_types(&data, &mut builder)?;
    load_type_relations(&data, &mut builder)?;
    load_properties_and_events(&data, &mut builder)?;
    load_specs(&data, &mut builder)?;

    if let Some(user_strings) = data.user_strings {
        builder.set_user_strings(UserStrings::from(user_strings)?);
    }

    let entry_point = Token::new(data.header.entry_point_token);
    if entry_point.table() == TableId::MethodDef as u8 && !entry_point.is_null() {
        builder.set_entry_point(entry_point);
    }

    let assembly = builder.build();
    debug!(
        assembly = %assembly.name,
        runtime = %data.version,
        types = assembly.types.len(),
        methods = assembly.methods.len(),
        "metadata loaded"
    );

    Ok(assembly)
}

#[allow(clippy::cast_possible_truncation)]
fn version_of(row: &crate::metadata::tables::Row, first: usize) -> AssemblyVersion {
    AssemblyVersion::new(
        row.get(first) as u16,
        row.get(first + 1) as u16,
        row.get(first + 2) as u16,
        row.get(first + 3) as u16,
    )
}

fn expect_token(added: Token, table: TableId, rid: u32) -> Result<()> {
    if added != table.token(rid) {
        return Err(malformed_error!(
            "{:?} list is not contiguous - row {} became {}",
            table,
            rid,
            added
        ));
    }

    Ok(())
}

fn load_references(data: &LoaderData, builder: &mut AssemblyBuilder) -> Result<()> {
    let tables = &data.tables;

    for rid in 1..=tables.rows(TableId::AssemblyRef) {
        let row = tables.row(TableId::AssemblyRef, rid)?;
        let token = builder.add_assembly_ref(&data.string(row.get(6))?, version_of(&row, 0));
        expect_token(token, TableId::AssemblyRef, rid)?;
    }

    for rid in 1..=tables.rows(TableId::TypeRef) {
        let row = tables.row(TableId::TypeRef, rid)?;
        builder.add_type_ref(row.token(0), &data.string(row.get(2))?, &data.string(row.get(1))?);
    }

    Ok(())
}

fn decode_method(data: &LoaderData, rid: u32) -> Result<MethodRow> {
    let row = data.tables.row(TableId::MethodDef, rid)?;
    let token = TableId::MethodDef.token(rid);
    let rva = row.get(0);
    #[allow(clippy::cast_possible_truncation)]
    let (impl_flags, flags) = (row.get(1) as u16, row.get(2) as u16);

    let signature = match parse_method_signature(data.blob(row.get(4))?) {
        Ok(signature) => signature,
        Err(error) => {
            warn!(method = %token, %error, "unreadable method signature");
            SignatureMethod::new(false, TypeSignature::Void, Vec::new())
        }
    };

    let body = if rva == 0 || impl_flags & METHOD_IMPL_RUNTIME == METHOD_IMPL_RUNTIME {
        None
    } else {
        match read_body(data, rva) {
            Ok(code) => Some(code),
            Err(error) => {
                warn!(method = %token, %error, "skipping malformed method body");
                None
            }
        }
    };

    Ok(MethodRow {
        name: data.string(row.get(3))?,
        flags,
        impl_flags,
        signature,
        body,
        param_start: row.get(5),
    })
}

fn read_body(data: &LoaderData, rva: u32) -> Result<Arc<[u8]>> {
    let offset = data.file.rva_to_offset(rva as usize)?;
    let Some(slice) = data.file.data().get(offset..) else {
        return Err(crate::Error::OutOfBounds);
    };

    let body = MethodBody::from(slice)?;
    Ok(Arc::from(body.code(slice)?))
}

fn load_types(data: &LoaderData, builder: &mut AssemblyBuilder) -> Result<()> {
    let tables = &data.tables;
    let type_count = tables.rows(TableId::TypeDef);

    let mut rows = Vec::with_capacity(type_count as usize);
    for rid in 1..=type_count {
        let row = tables.row(TableId::TypeDef, rid)?;
        let token = builder.add_type(
            &data.string(row.get(2))?,
            &data.string(row.get(1))?,
            row.get(0),
            Some(row.token(3)),
        );
        expect_token(token, TableId::TypeDef, rid)?;
        rows.push(row);
    }

    let methods: Vec<MethodRow> = (1..=tables.rows(TableId::MethodDef))
        .into_par_iter()
        .map(|rid| decode_method(data, rid))
        .collect::<Result<Vec<_>>>()?;

    for (index, row) in rows.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let rid = index as u32 + 1;
        let owner = TableId::TypeDef.token(rid);

        let field_end = tables.list_end(TableId::TypeDef, rid, 4, TableId::Field)?;
        for field_rid in row.get(4)..field_end {
            let field = tables.row(TableId::Field, field_rid)?;
            let token = TableId::Field.token(field_rid);
            let signature = match parse_field_signature(data.blob(field.get(2))?) {
                Ok(signature) => signature.base,
                Err(error) => {
                    warn!(field = %token, %error, "unreadable field signature");
                    TypeSignature::Object
                }
            };

            #[allow(clippy::cast_possible_truncation)]
            let added = builder.add_field(
                owner,
                &data.string(field.get(1))?,
                field.get(0) as u16,
                signature,
            );
            expect_token(added, TableId::Field, field_rid)?;
        }

        let method_end = tables.list_end(TableId::TypeDef, rid, 5, TableId::MethodDef)?;
        for method_rid in row.get(5)..method_end {
            let Some(method) = (method_rid as usize)
                .checked_sub(1)
                .and_then(|index| methods.get(index))
            else {
                return Err(malformed_error!("Method list points outside the table - {}", method_rid));
            };

            let added = builder.add_method(owner, &method.name, method.flags, method.signature.clone());
            expect_token(added, TableId::MethodDef, method_rid)?;
            builder.set_impl_flags(added, method.impl_flags);
            if let Some(body) = &method.body {
                builder.set_body(added, body.to_vec());
            }

            let param_end = match methods.get(method_rid as usize) {
                Some(next) => next.param_start,
                None => tables.rows(TableId::Param) + 1,
            };
            let mut names = vec![String::new(); method.signature.params.len()];
            for param_rid in method.param_start..param_end {
                let param = tables.row(TableId::Param, param_rid)?;
                let sequence = param.get(1) as usize;
                if sequence > 0 && sequence <= names.len() {
                    names[sequence - 1] = data.string(param.get(2))?;
                }
            }
            builder.set_param_names(added, names);
        }
    }

    Ok(())
}

fn load_type_relations(data: &LoaderData, builder: &mut AssemblyBuilder) -> Result<()> {
    let tables = &data.tables;

    for rid in 1..=tables.rows(TableId::InterfaceImpl) {
        let row = tables.row(TableId::InterfaceImpl, rid)?;
        builder.add_interface(TableId::TypeDef.token(row.get(0)), row.token(1));
    }

    for rid in 1..=tables.rows(TableId::NestedClass) {
        let row = tables.row(TableId::NestedClass, rid)?;
        builder.nest(
            TableId::TypeDef.token(row.get(0)),
            TableId::TypeDef.token(row.get(1)),
        );
    }

    let mut generic_params = Vec::new();
    for rid in 1..=tables.rows(TableId::GenericParam) {
        let row = tables.row(TableId::GenericParam, rid)?;
        generic_params.push((row.token(2), row.get(0), data.string(row.get(3))?));
    }
    generic_params.sort_by_key(|(owner, number, _)| (*owner, *number));
    for (owner, _, name) in generic_params {
        builder.add_generic_param(owner, &name);
    }

    Ok(())
}

fn load_properties_and_events(data: &LoaderData, builder: &mut AssemblyBuilder) -> Result<()> {
    let tables = &data.tables;

    for map_rid in 1..=tables.rows(TableId::PropertyMap) {
        let map = tables.row(TableId::PropertyMap, map_rid)?;
        let owner = TableId::TypeDef.token(map.get(0));
        let end = tables.list_end(TableId::PropertyMap, map_rid, 1, TableId::Property)?;
        for rid in map.get(1)..end {
            let row = tables.row(TableId::Property, rid)?;
            let token = TableId::Property.token(rid);
            let signature = match parse_property_signature(data.blob(row.get(2))?) {
                Ok(signature) => signature,
                Err(error) => {
                    warn!(property = %token, %error, "unreadable property signature");
                    SignatureProperty {
                        has_this: true,
                        base: TypeSignature::Object,
                        params: Vec::new(),
                    }
                }
            };

            #[allow(clippy::cast_possible_truncation)]
            let added =
                builder.add_property(owner, &data.string(row.get(1))?, row.get(0) as u16, signature);
            expect_token(added, TableId::Property, rid)?;
        }
    }

    for map_rid in 1..=tables.rows(TableId::EventMap) {
        let map = tables.row(TableId::EventMap, map_rid)?;
        let owner = TableId::TypeDef.token(map.get(0));
        let end = tables.list_end(TableId::EventMap, map_rid, 1, TableId::Event)?;
        for rid in map.get(1)..end {
            let row = tables.row(TableId::Event, rid)?;
            #[allow(clippy::cast_possible_truncation)]
            let added = builder.add_event(
                owner,
                &data.string(row.get(1))?,
                row.get(0) as u16,
                Some(row.token(2)),
            );
            expect_token(added, TableId::Event, rid)?;
        }
    }

    for rid in 1..=tables.rows(TableId::MethodSemantics) {
        let row = tables.row(TableId::MethodSemantics, rid)?;
        #[allow(clippy::cast_possible_truncation)]
        builder.set_semantics(
            row.token(2),
            TableId::MethodDef.token(row.get(1)),
            row.get(0) as u16,
        );
    }

    Ok(())
}

fn load_specs(data: &LoaderData, builder: &mut AssemblyBuilder) -> Result<()> {
    let tables = &data.tables;

    for rid in 1..=tables.rows(TableId::MemberRef) {
        let row = tables.row(TableId::MemberRef, rid)?;
        let token = TableId::MemberRef.token(rid);
        let blob = data.blob(row.get(2))?;
        let parsed = if blob.first() == Some(&0x06) {
            parse_field_signature(blob).map(|field| MemberRefSignature::Field(field.base))
        } else {
            parse_method_signature(blob).map(MemberRefSignature::Method)
        };
        let signature = parsed.unwrap_or_else(|error| {
            warn!(member_ref = %token, %error, "unreadable member reference signature");
            MemberRefSignature::Method(SignatureMethod::new(false, TypeSignature::Void, Vec::new()))
        });

        builder.add_member_ref(row.token(0), &data.string(row.get(1))?, signature);
    }

    for rid in 1..=tables.rows(TableId::TypeSpec) {
        let row = tables.row(TableId::TypeSpec, rid)?;
        let signature =
            parse_type_spec_signature(data.blob(row.get(0))?).unwrap_or_else(|error| {
                warn!(type_spec = %TableId::TypeSpec.token(rid), %error, "unreadable type specification");
                TypeSignature::Object
            });
        builder.add_type_spec(signature);
    }

    for rid in 1..=tables.rows(TableId::MethodSpec) {
        let row = tables.row(TableId::MethodSpec, rid)?;
        let instantiation = parse_method_spec_signature(data.blob(row.get(1))?)
            .unwrap_or_else(|error| {
                warn!(method_spec = %TableId::MethodSpec.token(rid), %error, "unreadable method instantiation");
                SignatureMethodSpec {
                    generic_args: Vec::new(),
                }
            });
        builder.add_method_spec(row.token(0), instantiation);
    }

    Ok(())
}
