//! Signature encoders, the exact inverse of [`crate::metadata::signatures::SignatureParser`].

use crate::{
    file::io::{write_compressed_int, write_compressed_uint},
    metadata::{
        signatures::{
            CallingConvention, SignatureField, SignatureLocalVariables, SignatureMethod,
            SignatureMethodSpec, SignatureProperty, TypeSignature, CALLING_CONVENTION,
            ELEMENT_TYPE, MAX_RECURSION_DEPTH, SIGNATURE_HEADER,
        },
        tables::{TableId, TableIndex},
    },
    Error, Result,
};

/// Append a `TypeDefOrRefOrSpecEncoded` token
///
/// # Errors
/// Returns an error if the index is not a TypeDef, TypeRef or TypeSpec
pub fn write_compressed_token(out: &mut Vec<u8>, index: TableIndex) -> Result<()> {
    let tag = match index.table {
        TableId::TYPE_DEF => 0,
        TableId::TYPE_REF => 1,
        TableId::TYPE_SPEC => 2,
        other => {
            return Err(malformed_error!(
                "{} cannot be encoded as a TypeDefOrRef token",
                other
            ))
        }
    };

    write_compressed_uint(out, (index.one_based() << 2) | tag)
}

struct SignatureEncoder {
    out: Vec<u8>,
    depth: usize,
}

impl SignatureEncoder {
    fn new() -> Self {
        SignatureEncoder {
            out: Vec::new(),
            depth: 0,
        }
    }

    fn encode_type(&mut self, signature: &TypeSignature) -> Result<()> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(Error::RecursionLimit(MAX_RECURSION_DEPTH));
        }

        match signature {
            TypeSignature::Void => self.out.push(ELEMENT_TYPE::VOID),
            TypeSignature::Boolean => self.out.push(ELEMENT_TYPE::BOOLEAN),
            TypeSignature::Char => self.out.push(ELEMENT_TYPE::CHAR),
            TypeSignature::I1 => self.out.push(ELEMENT_TYPE::I1),
            TypeSignature::U1 => self.out.push(ELEMENT_TYPE::U1),
            TypeSignature::I2 => self.out.push(ELEMENT_TYPE::I2),
            TypeSignature::U2 => self.out.push(ELEMENT_TYPE::U2),
            TypeSignature::I4 => self.out.push(ELEMENT_TYPE::I4),
            TypeSignature::U4 => self.out.push(ELEMENT_TYPE::U4),
            TypeSignature::I8 => self.out.push(ELEMENT_TYPE::I8),
            TypeSignature::U8 => self.out.push(ELEMENT_TYPE::U8),
            TypeSignature::R4 => self.out.push(ELEMENT_TYPE::R4),
            TypeSignature::R8 => self.out.push(ELEMENT_TYPE::R8),
            TypeSignature::String => self.out.push(ELEMENT_TYPE::STRING),
            TypeSignature::Ptr(inner) => {
                self.out.push(ELEMENT_TYPE::PTR);
                self.encode_type(inner)?;
            }
            TypeSignature::ByRef(inner) => {
                self.out.push(ELEMENT_TYPE::BYREF);
                self.encode_type(inner)?;
            }
            TypeSignature::ValueType(index) => {
                self.out.push(ELEMENT_TYPE::VALUETYPE);
                write_compressed_token(&mut self.out, *index)?;
            }
            TypeSignature::Class(index) => {
                self.out.push(ELEMENT_TYPE::CLASS);
                write_compressed_token(&mut self.out, *index)?;
            }
            TypeSignature::Var(number) => {
                self.out.push(ELEMENT_TYPE::VAR);
                write_compressed_uint(&mut self.out, *number)?;
            }
            TypeSignature::Array(element, shape) => {
                self.out.push(ELEMENT_TYPE::ARRAY);
                self.encode_type(element)?;
                write_compressed_uint(&mut self.out, shape.rank)?;
                write_compressed_uint(&mut self.out, shape.sizes.len() as u32)?;
                for size in &shape.sizes {
                    write_compressed_uint(&mut self.out, *size)?;
                }
                write_compressed_uint(&mut self.out, shape.lower_bounds.len() as u32)?;
                for bound in &shape.lower_bounds {
                    write_compressed_int(&mut self.out, *bound)?;
                }
            }
            TypeSignature::GenericInst {
                is_value_type,
                generic,
                args,
            } => {
                self.out.push(ELEMENT_TYPE::GENERICINST);
                self.out.push(if *is_value_type {
                    ELEMENT_TYPE::VALUETYPE
                } else {
                    ELEMENT_TYPE::CLASS
                });
                write_compressed_token(&mut self.out, *generic)?;
                write_compressed_uint(&mut self.out, args.len() as u32)?;
                for arg in args {
                    self.encode_type(arg)?;
                }
            }
            TypeSignature::TypedByRef => self.out.push(ELEMENT_TYPE::TYPEDBYREF),
            TypeSignature::I => self.out.push(ELEMENT_TYPE::I),
            TypeSignature::U => self.out.push(ELEMENT_TYPE::U),
            TypeSignature::FnPtr(method) => {
                self.out.push(ELEMENT_TYPE::FNPTR);
                self.encode_method(method)?;
            }
            TypeSignature::Object => self.out.push(ELEMENT_TYPE::OBJECT),
            TypeSignature::SzArray(inner) => {
                self.out.push(ELEMENT_TYPE::SZARRAY);
                self.encode_type(inner)?;
            }
            TypeSignature::MVar(number) => {
                self.out.push(ELEMENT_TYPE::MVAR);
                write_compressed_uint(&mut self.out, *number)?;
            }
            TypeSignature::Modified(modifier, inner) => {
                self.out.push(if modifier.required {
                    ELEMENT_TYPE::CMOD_REQD
                } else {
                    ELEMENT_TYPE::CMOD_OPT
                });
                write_compressed_token(&mut self.out, modifier.modifier)?;
                self.encode_type(inner)?;
            }
            TypeSignature::Pinned(inner) => {
                self.out.push(ELEMENT_TYPE::PINNED);
                self.encode_type(inner)?;
            }
            TypeSignature::Internal => self.out.push(ELEMENT_TYPE::INTERNAL),
        }

        self.depth -= 1;
        Ok(())
    }

    fn encode_method(&mut self, signature: &SignatureMethod) -> Result<()> {
        let mut convention = signature.calling_convention.bits();
        if signature.generic_param_count > 0 {
            convention |= CALLING_CONVENTION::GENERIC;
        }
        if signature.has_this {
            convention |= CALLING_CONVENTION::HASTHIS;
        }
        if signature.explicit_this {
            convention |= CALLING_CONVENTION::EXPLICITTHIS;
        }
        self.out.push(convention);

        if signature.generic_param_count > 0 {
            write_compressed_uint(&mut self.out, signature.generic_param_count)?;
        }

        write_compressed_uint(
            &mut self.out,
            (signature.params.len() + signature.varargs.len()) as u32,
        )?;
        self.encode_type(&signature.return_type)?;
        for param in &signature.params {
            self.encode_type(param)?;
        }

        if !signature.varargs.is_empty() {
            self.out.push(ELEMENT_TYPE::SENTINEL);
            for param in &signature.varargs {
                self.encode_type(param)?;
            }
        }

        Ok(())
    }
}

/// Encode a method signature
///
/// # Errors
/// Returns an error if an embedded index cannot be encoded
pub fn encode_method_signature(signature: &SignatureMethod) -> Result<Vec<u8>> {
    if !signature.varargs.is_empty() && signature.calling_convention != CallingConvention::VarArg {
        return Err(malformed_error!(
            "Only vararg signatures may carry arguments after the sentinel"
        ));
    }

    let mut encoder = SignatureEncoder::new();
    encoder.encode_method(signature)?;
    Ok(encoder.out)
}

/// Encode a field signature
///
/// # Errors
/// Returns an error if an embedded index cannot be encoded
pub fn encode_field_signature(signature: &SignatureField) -> Result<Vec<u8>> {
    let mut encoder = SignatureEncoder::new();
    encoder.out.push(SIGNATURE_HEADER::FIELD);
    encoder.encode_type(&signature.field_type)?;
    Ok(encoder.out)
}

/// Encode a property signature
///
/// # Errors
/// Returns an error if an embedded index cannot be encoded
pub fn encode_property_signature(signature: &SignatureProperty) -> Result<Vec<u8>> {
    let mut encoder = SignatureEncoder::new();
    let mut head = SIGNATURE_HEADER::PROPERTY;
    if signature.has_this {
        head |= CALLING_CONVENTION::HASTHIS;
    }
    encoder.out.push(head);
    write_compressed_uint(&mut encoder.out, signature.params.len() as u32)?;
    encoder.encode_type(&signature.property_type)?;
    for param in &signature.params {
        encoder.encode_type(param)?;
    }
    Ok(encoder.out)
}

/// Encode a local variable signature
///
/// # Errors
/// Returns an error if an embedded index cannot be encoded
pub fn encode_local_var_signature(signature: &SignatureLocalVariables) -> Result<Vec<u8>> {
    let mut encoder = SignatureEncoder::new();
    encoder.out.push(SIGNATURE_HEADER::LOCAL_SIG);
    write_compressed_uint(&mut encoder.out, signature.locals.len() as u32)?;
    for local in &signature.locals {
        encoder.encode_type(local)?;
    }
    Ok(encoder.out)
}

/// Encode a type specification
///
/// # Errors
/// Returns an error if an embedded index cannot be encoded
pub fn encode_typespec_signature(signature: &TypeSignature) -> Result<Vec<u8>> {
    let mut encoder = SignatureEncoder::new();
    encoder.encode_type(signature)?;
    Ok(encoder.out)
}

/// Encode a generic method instantiation
///
/// # Errors
/// Returns an error if an embedded index cannot be encoded
pub fn encode_method_spec_signature(signature: &SignatureMethodSpec) -> Result<Vec<u8>> {
    let mut encoder = SignatureEncoder::new();
    encoder.out.push(SIGNATURE_HEADER::METHOD_SPEC);
    write_compressed_uint(&mut encoder.out, signature.generic_args.len() as u32)?;
    for arg in &signature.generic_args {
        encoder.encode_type(arg)?;
    }
    Ok(encoder.out)
}
