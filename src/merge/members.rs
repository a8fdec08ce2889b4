//! Signatures, member references and method bodies.

use std::collections::HashMap;

use crate::{
    merge::{
        cctor::splice_bodies,
        context::{blob_key, MergeContext},
        MergeWarning,
    },
    metadata::{
        method::MethodBody,
        signatures::SignatureLocalVariables,
        tables::{
            columns::{field, memberref, methoddef, methodspec, moduleref, standalonesig, typedef},
            Blob, Cell, RawData, TableId, TableIndex, Tables,
        },
    },
    Error, Result,
};

/// Translate the index-bearing columns of the definition rows emitted by the type phase
pub(crate) fn translate_definitions(ctx: &mut MergeContext<'_>) -> Result<()> {
    for (table, column) in [
        (TableId::TYPE_DEF, typedef::EXTENDS),
        (TableId::FIELD, field::SIGNATURE),
        (TableId::METHOD_DEF, methoddef::SIGNATURE),
    ] {
        translate_column(ctx, table, column)?;
    }
    Ok(())
}

fn translate_column(ctx: &mut MergeContext<'_>, table: TableId, column: usize) -> Result<()> {
    for position in 0..ctx.target.len(table) {
        let index = TableIndex::new(table, position as u32);
        let Some((input, _)) = ctx.maps.origin(index) else {
            continue;
        };
        let row = ctx.target.row_mut(index)?;
        ctx.maps.translate(input, &mut row.cells_mut()[column])?;
    }
    Ok(())
}

/// The definition of `name` with exactly `signature` within the target type `owner`
fn find_member(
    target: &Tables,
    owner: TableIndex,
    name: &str,
    signature: &Blob,
) -> Result<Option<TableIndex>> {
    let (table, list, name_column, signature_column) = match signature {
        Blob::Field(_) => (TableId::FIELD, typedef::FIELD_LIST, field::NAME, field::SIGNATURE),
        Blob::Method(method) if method.varargs.is_empty() => (
            TableId::METHOD_DEF,
            typedef::METHOD_LIST,
            methoddef::NAME,
            methoddef::SIGNATURE,
        ),
        _ => return Ok(None),
    };

    let (start, end) = target.list_range(owner, list)?;
    for position in start..end {
        let index = TableIndex::new(table, position);
        let row = target.row(index)?;
        if row.string(name_column)? == name && row.blob(signature_column)? == signature {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn member_parent(ctx: &MergeContext<'_>, input: usize, class: TableIndex) -> Result<TableIndex> {
    if class.table == TableId::MODULE_REF && ctx.maps.get(input, class).is_none() {
        let name = ctx.source(input).row(class)?.string(moduleref::NAME)?;
        if ctx.merged_module(name).is_some() {
            return Ok(TableIndex::new(TableId::TYPE_DEF, 0));
        }
    }
    ctx.maps.map(input, class)
}

/// `MemberRef` rows; references to members of merged types become the definitions
pub(crate) fn merge_member_refs(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut seen: HashMap<(TableIndex, String, Vec<u8>), TableIndex> = HashMap::new();

    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::MEMBER_REF).iter() {
            let Some(class) = row.index(memberref::CLASS)? else {
                return Err(malformed_error!("MemberRef row {} has no parent", index.row + 1));
            };
            let parent = member_parent(ctx, input, class)?;
            let name = row.string(memberref::NAME)?;
            let mut signature = row.blob(memberref::SIGNATURE)?.clone();
            ctx.maps.translate(input, &mut signature)?;

            if parent.table == TableId::TYPE_DEF {
                if let Some(member) = find_member(&ctx.target, parent, name, &signature)? {
                    ctx.maps.record(input, index, member);
                    continue;
                }
                if class.table == TableId::TYPE_REF {
                    let owner = ctx.inputs[input].full_name_with(class, &ctx.info[input].nesting)?;
                    ctx.warn(MergeWarning::UnresolvedMemberReference {
                        input,
                        member: format!("{owner}::{name}"),
                    });
                }
            }

            let key = (parent, name.to_string(), blob_key(&signature)?);
            let target = match seen.get(&key) {
                Some(existing) => *existing,
                None => {
                    let target = ctx.target.push(
                        TableId::MEMBER_REF,
                        vec![Cell::index(parent), Cell::str(name), Cell::Blob(signature)],
                    )?;
                    seen.insert(key, target);
                    target
                }
            };
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// `MethodSpec` rows, one per method and instantiation
pub(crate) fn merge_method_specs(ctx: &mut MergeContext<'_>) -> Result<()> {
    let mut seen: HashMap<(Option<TableIndex>, Vec<u8>), TableIndex> = HashMap::new();

    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::METHOD_SPEC).iter() {
            let cells = ctx.maps.translate_row(input, row)?;
            let method = match &cells[methodspec::METHOD] {
                Cell::Index(method) => *method,
                _ => None,
            };
            let key = match &cells[methodspec::INSTANTIATION] {
                Cell::Blob(blob) => (method, blob_key(blob)?),
                _ => (method, Vec::new()),
            };

            let target = match seen.get(&key) {
                Some(existing) => *existing,
                None => {
                    let target = ctx.target.push(TableId::METHOD_SPEC, cells)?;
                    seen.insert(key, target);
                    target
                }
            };
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// `StandAloneSig` rows, copied one to one
pub(crate) fn merge_standalone_sigs(ctx: &mut MergeContext<'_>) -> Result<()> {
    for input in 0..ctx.inputs.len() {
        for (index, row) in ctx.source(input).table(TableId::STANDALONE_SIG).iter() {
            let cells = ctx.maps.translate_row(input, row)?;
            let target = ctx.target.push(TableId::STANDALONE_SIG, cells)?;
            ctx.maps.record(input, index, target);
        }
    }
    Ok(())
}

/// Rewrite the tokens of every copied method body
pub(crate) fn translate_bodies(ctx: &mut MergeContext<'_>) -> Result<()> {
    translate_column(ctx, TableId::METHOD_DEF, methoddef::RVA)
}

fn source_body(ctx: &MergeContext<'_>, input: usize, method: TableIndex) -> Result<MethodBody> {
    match ctx.source(input).row(method)?.raw_data(methoddef::RVA)? {
        RawData::MethodBody(body) => {
            let mut body = (**body).clone();
            ctx.maps.translate(input, &mut body)?;
            Ok(body)
        }
        _ => Err(Error::NotSupported),
    }
}

fn locals_of(ctx: &MergeContext<'_>, body: &MethodBody) -> Result<SignatureLocalVariables> {
    let Some(signature) = body.local_var_sig else {
        return Ok(SignatureLocalVariables::default());
    };
    match ctx.target.row(signature)?.blob(standalonesig::SIGNATURE)? {
        Blob::Locals(locals) => Ok(locals.clone()),
        _ => Err(Error::NotSupported),
    }
}

/// Replace every spliced static constructor by the concatenation of its sources
pub(crate) fn splice_static_constructors(ctx: &mut MergeContext<'_>) -> Result<()> {
    let splices = std::mem::take(&mut ctx.splices);

    for splice in &splices {
        let mut bodies = Vec::with_capacity(splice.sources.len());
        let mut counts = Vec::with_capacity(splice.sources.len());
        let mut locals = SignatureLocalVariables::default();

        for &(input, method) in &splice.sources {
            let body = source_body(ctx, input, method)?;
            let body_locals = locals_of(ctx, &body)?;
            counts.push(u16::try_from(body_locals.locals.len()).map_err(|_| Error::NotSupported)?);
            locals.locals.extend(body_locals.locals);
            bodies.push(body);
        }

        log::debug!(
            "Splicing {} static constructors into {}",
            bodies.len(),
            splice.target
        );
        let mut merged = splice_bodies(&bodies, &counts)?;
        if !locals.locals.is_empty() {
            merged.local_var_sig = Some(ctx.target.push(
                TableId::STANDALONE_SIG,
                vec![Cell::Blob(Blob::Locals(locals))],
            )?);
        }
        ctx.target.set(
            splice.target,
            methoddef::RVA,
            Cell::RawData(RawData::MethodBody(Box::new(merged))),
        )?;
    }

    ctx.splices = splices;
    Ok(())
}
