//! N-way merging of metadata graphs into one.
//!
//! [`merge`] builds a fresh target table set from an ordered list of inputs. The first input
//! is the primary one: it supplies the `Module` and `Assembly` rows, and its definitions
//! win every tie. The merge runs in phases, each of which translates one group of tables
//! into the target index space and records the mapping:
//!
//! 1. type definitions with their fields, methods, parameters, nesting and generic
//!    parameters, applying the [`DuplicatePolicy`]
//! 2. assembly, module and type references; references into merged inputs become
//!    definitions
//! 3. signatures, member references, method specifications and standalone signatures
//! 4. method bodies, splicing static constructors of unioned types
//! 5. every remaining table
//! 6. internalization, retargetable fixups and identity overrides
//! 7. sorting and deduplication of the target
//!
//! The result carries a [`TokenRemapper`] from every input token to its final target token,
//! which the debug information collaborator consumes.
//!
//! # Example
//!
//! ```rust,no_run
//! use cilmerge::{
//!     collaborators::Collaborators,
//!     merge::{merge, MergeOptions},
//!     CilMetadata,
//! };
//!
//! # fn inputs() -> (CilMetadata, CilMetadata) { unimplemented!() }
//! let (app, lib) = inputs();
//! let options = MergeOptions::default().union(true).internalize(true);
//! let result = merge(&[&app, &lib], &options, &Collaborators::default())?;
//! for warning in &result.warnings {
//!     println!("{warning}");
//! }
//! # Ok::<(), cilmerge::Error>(())
//! ```

mod cctor;
mod context;
mod members;
mod options;
mod policy;
mod references;
mod tables;
mod types;

use std::{collections::HashMap, fmt, time::Duration};

pub use cctor::splice_bodies;
pub use options::{compile_patterns, parse_rename_mapping, DuplicatePolicy, MergeOptions, Version};

use crate::{
    collaborators::{Collaborators, DebugInput, MergedFunction, PdbWriter, XmlDocMerger},
    metadata::{
        graph::CilMetadata,
        tables::{Permutation, TableId, TableIndex},
        token::Token,
    },
    Error, Result,
};

use context::MergeContext;

/// A soft mismatch found while merging; the merge went on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeWarning {
    /// A member reference into a merged type matched no definition and was kept as is
    UnresolvedMemberReference {
        /// Input holding the reference
        input: usize,
        /// `Type::member`
        member: String,
    },
    /// A type reference into a merged input matched no definition and was kept as is
    UnresolvedTypeReference {
        /// Input holding the reference
        input: usize,
        /// Full name of the referenced type
        type_name: String,
    },
    /// A second manifest resource with the same name was dropped
    DuplicateResource {
        /// Input whose resource was dropped
        input: usize,
        /// Resource name
        name: String,
    },
    /// No assembly was found to fix a retargetable reference against
    UnresolvedRetargetable {
        /// Display name of the reference
        assembly: String,
    },
}

impl fmt::Display for MergeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeWarning::UnresolvedMemberReference { input, member } => {
                write!(f, "input {input}: unresolved member reference {member}")
            }
            MergeWarning::UnresolvedTypeReference { input, type_name } => {
                write!(f, "input {input}: unresolved type reference {type_name}")
            }
            MergeWarning::DuplicateResource { input, name } => {
                write!(f, "input {input}: duplicate resource {name} dropped")
            }
            MergeWarning::UnresolvedRetargetable { assembly } => {
                write!(f, "retargetable reference {assembly} could not be resolved")
            }
        }
    }
}

/// A static constructor of the target assembled from several inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CctorSplice {
    /// The target `.cctor`
    pub target: TableIndex,
    /// The source constructors, in input order
    pub sources: Vec<(usize, TableIndex)>,
}

/// Translates input indices into the final target index space
#[derive(Debug, Clone, Default)]
pub struct TokenRemapper {
    forward: Vec<HashMap<TableIndex, TableIndex>>,
    permutation: Permutation,
}

impl TokenRemapper {
    pub(crate) fn new(forward: Vec<HashMap<TableIndex, TableIndex>>, permutation: Permutation) -> Self {
        TokenRemapper {
            forward,
            permutation,
        }
    }

    /// Number of inputs covered
    #[must_use]
    pub fn inputs(&self) -> usize {
        self.forward.len()
    }

    /// The final target row of row `index` of input `input`, if the row survived
    #[must_use]
    pub fn remap(&self, input: usize, index: TableIndex) -> Option<TableIndex> {
        self.forward
            .get(input)?
            .get(&index)
            .map(|target| self.permutation.map(*target))
    }

    /// Like [`TokenRemapper::remap`] on metadata tokens. Null and `#US` tokens are not
    /// table rows and yield `None`.
    #[must_use]
    pub fn remap_token(&self, input: usize, token: Token) -> Option<Token> {
        if token.is_user_string() {
            return None;
        }
        let index = TableIndex::from_token(token).ok()??;
        self.remap(input, index).map(TableIndex::token)
    }

    /// The reordering applied when the target was sorted
    #[must_use]
    pub fn permutation(&self) -> &Permutation {
        &self.permutation
    }
}

/// The outcome of [`merge`]
#[derive(Debug)]
pub struct MergeResult {
    /// The merged graph, sorted and deduplicated
    pub target: CilMetadata,
    /// Soft mismatches
    pub warnings: Vec<MergeWarning>,
    /// Per input, the original to new full names of renamed types
    pub type_renames: Vec<HashMap<String, String>>,
    /// Input to target index translation
    pub remapper: TokenRemapper,
    /// Every method of the target with its origin
    pub functions: Vec<MergedFunction>,
    /// Wall time of every phase
    pub phase_times: Vec<(&'static str, Duration)>,
}

impl MergeResult {
    /// The debug directory of the merged module, as produced by `pdb`
    ///
    /// # Errors
    /// Returns [`Error::Pdb`] if the writer fails
    pub fn debug_directory(&self, pdb: &dyn PdbWriter, inputs: &[DebugInput]) -> Result<Vec<u8>> {
        pdb.write(&self.remapper, inputs, &self.functions)
            .map_err(|error| match error {
                Error::Pdb(_) => error,
                other => Error::Pdb(other.to_string()),
            })
    }

    /// The merged XML documentation of `resources`, as produced by `merger`
    ///
    /// # Errors
    /// Returns [`Error::XmlDoc`] if the merger fails
    pub fn xml_documentation(
        &self,
        merger: &dyn XmlDocMerger,
        resources: &[String],
    ) -> Result<Option<String>> {
        merger
            .merge(resources, &self.type_renames)
            .map_err(|error| match error {
                Error::XmlDoc(_) => error,
                other => Error::XmlDoc(other.to_string()),
            })
    }
}

/// Merge `inputs` into one graph. The first input is the primary one.
///
/// # Errors
/// Returns [`Error::NoInputs`] for an empty input list, [`Error::DuplicateType`] and
/// [`Error::GenericParameterMismatch`] for type conflicts the options do not resolve,
/// [`Error::KeyError`] for an unusable signing key, and format errors for inputs whose
/// tables are inconsistent
pub fn merge(
    inputs: &[&CilMetadata],
    options: &MergeOptions,
    collaborators: &Collaborators,
) -> Result<MergeResult> {
    let mut times = Vec::new();
    let mut ctx = MergeContext::new(inputs, options, collaborators)?;
    log::info!(
        "Merging {} inputs into {}",
        inputs.len(),
        ctx.info[0].module
    );

    timed!("type definitions", times, {
        types::merge_module_and_assembly(&mut ctx)?;
        types::plan_types(&mut ctx)?;
        types::emit_types(&mut ctx)?;
        types::merge_nested_classes(&mut ctx)?;
        types::merge_generic_params(&mut ctx)?;
    });
    timed!("references", times, {
        references::merge_assembly_refs(&mut ctx)?;
        references::merge_module_refs(&mut ctx)?;
        references::merge_type_references(&mut ctx)?;
    });
    timed!("signatures", times, {
        members::translate_definitions(&mut ctx)?;
        members::merge_member_refs(&mut ctx)?;
        members::merge_method_specs(&mut ctx)?;
        members::merge_standalone_sigs(&mut ctx)?;
    });
    timed!("method bodies", times, {
        members::translate_bodies(&mut ctx)?;
        members::splice_static_constructors(&mut ctx)?;
    });
    timed!("remaining tables", times, {
        tables::merge_remaining_tables(&mut ctx)?;
    });
    timed!("policies", times, {
        policy::apply(&mut ctx)?;
    });

    let mut result = timed!("finalize", times, { finalize(ctx)? });
    result.phase_times = times;
    Ok(result)
}

fn finalize(ctx: MergeContext<'_>) -> Result<MergeResult> {
    let version = ctx.inputs[0].version().to_string();
    let MergeContext {
        mut target,
        maps,
        warnings,
        type_renames,
        ..
    } = ctx;

    target.validate()?;
    let permutation = target.reorder_sorted(true)?;

    let functions = (0..target.len(TableId::METHOD_DEF))
        .filter_map(|position| {
            let index = TableIndex::new(TableId::METHOD_DEF, position as u32);
            maps.origin(index).map(|(input, original)| MergedFunction {
                input,
                original,
                merged: permutation.map(index),
            })
        })
        .collect();

    let mut graph = CilMetadata::from_tables(target);
    graph.set_version(version);

    Ok(MergeResult {
        target: graph,
        warnings,
        type_renames,
        remapper: TokenRemapper::new(maps.into_forward(), permutation),
        functions,
        phase_times: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::{Instruction, OpCode, Operand},
        metadata::{
            method::MethodBody,
            signatures::{SignatureField, TypeSignature},
            tables::{columns::typedef, Blob},
        },
        test::builders::GraphBuilder,
    };

    fn ret() -> MethodBody {
        MethodBody {
            max_stack: 8,
            init_locals: false,
            local_var_sig: None,
            instructions: vec![Instruction::simple(OpCode::Ret)],
            exception_handlers: Vec::new(),
        }
    }

    fn type_names(graph: &CilMetadata) -> Vec<String> {
        graph
            .tables()
            .table(TableId::TYPE_DEF)
            .iter()
            .map(|(index, _)| graph.full_name(index).unwrap())
            .collect()
    }

    #[test]
    fn single_input_is_reproduced() {
        let mut builder = GraphBuilder::new("App");
        let class = builder.class("N", "C");
        builder.field(class, "value");
        builder.method(class, "Run", ret());
        let app = builder.build();

        let result = merge(&[&app], &MergeOptions::default(), &Collaborators::default()).unwrap();
        assert!(result.warnings.is_empty());
        assert_eq!(type_names(&result.target), type_names(&app));
        for table in [TableId::TYPE_DEF, TableId::FIELD, TableId::METHOD_DEF] {
            assert_eq!(result.target.tables().table(table).rows(), app.tables().table(table).rows());
        }
        assert_eq!(
            result.remapper.remap(0, class),
            Some(TableIndex::new(TableId::TYPE_DEF, 1))
        );
        assert_eq!(result.functions.len(), 1);
        assert_eq!(result.phase_times.len(), 7);
    }

    #[test]
    fn references_between_inputs_become_internal() {
        let mut builder = GraphBuilder::new("App");
        let lib = builder.assembly_ref("Lib");
        let helper = builder.type_ref(Some(lib), "Lib", "Helper");
        let field = builder.member_ref(
            helper,
            "Count",
            Blob::Field(SignatureField {
                field_type: TypeSignature::I4,
            }),
        );
        let main = builder.class("App", "Program");
        let body = MethodBody {
            instructions: vec![
                Instruction::new(OpCode::Ldsfld, Operand::Token(field)).unwrap(),
                Instruction::simple(OpCode::Pop),
                Instruction::simple(OpCode::Ret),
            ],
            ..ret()
        };
        builder.static_method(main, "Main", body);
        let app = builder.build();

        let mut builder = GraphBuilder::new("Lib");
        let class = builder.class("Lib", "Helper");
        let count = builder.field(class, "Count");
        let lib_graph = builder.build();

        let result = merge(
            &[&app, &lib_graph],
            &MergeOptions::default(),
            &Collaborators::default(),
        )
        .unwrap();
        let tables = result.target.tables();
        assert_eq!(tables.len(TableId::ASSEMBLY_REF), 0);
        assert_eq!(tables.len(TableId::TYPE_REF), 0);
        assert_eq!(tables.len(TableId::MEMBER_REF), 0);

        let target_count = result.remapper.remap(1, count).unwrap();
        assert_eq!(result.remapper.remap(0, field), Some(target_count));
        let main = tables.table(TableId::METHOD_DEF).get(0).unwrap();
        match main.raw_data(crate::metadata::tables::columns::methoddef::RVA).unwrap() {
            crate::metadata::tables::RawData::MethodBody(body) => {
                assert_eq!(body.instructions[0].operand, Operand::Token(target_count));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            type_names(&result.target),
            ["<Module>", "App.Program", "Lib.Helper"]
        );
    }

    #[test]
    fn unioned_static_constructors_are_spliced() {
        let mut builder = GraphBuilder::new("A");
        let class = builder.class("N", "C");
        builder.cctor(class, ret());
        let first = builder.build();

        let mut builder = GraphBuilder::new("B");
        let class = builder.class("N", "C");
        builder.cctor(class, ret());
        let second = builder.build();

        let result = merge(
            &[&first, &second],
            &MergeOptions::default().union(true),
            &Collaborators::default(),
        )
        .unwrap();
        let tables = result.target.tables();
        assert_eq!(tables.len(TableId::TYPE_DEF), 2);
        assert_eq!(tables.len(TableId::METHOD_DEF), 1);
        let row = tables.table(TableId::METHOD_DEF).get(0).unwrap();
        match row.raw_data(crate::metadata::tables::columns::methoddef::RVA).unwrap() {
            crate::metadata::tables::RawData::MethodBody(body) => {
                assert_eq!(body.instructions.len(), 2);
                assert_eq!(body.instructions[0].opcode, OpCode::Br);
                assert_eq!(body.instructions[1].opcode, OpCode::Ret);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            tables.table(TableId::TYPE_DEF).get(1).unwrap().string(typedef::TYPE_NAME).unwrap(),
            "C"
        );
    }

    #[test]
    fn remapper_tokens() {
        let remapper = TokenRemapper::new(
            vec![HashMap::from([(
                TableIndex::new(TableId::TYPE_DEF, 3),
                TableIndex::new(TableId::TYPE_DEF, 1),
            )])],
            Permutation::default(),
        );
        assert_eq!(
            remapper.remap_token(0, Token::new(0x0200_0004)),
            Some(Token::new(0x0200_0002))
        );
        assert_eq!(remapper.remap_token(0, Token::new(0x7000_0001)), None);
        assert_eq!(remapper.remap_token(1, Token::new(0x0200_0004)), None);
        assert_eq!(remapper.inputs(), 1);
    }
}
