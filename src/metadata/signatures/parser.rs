use crate::{
    file::parser::Parser,
    metadata::signatures::{
        ArrayShape, CallingConvention, CustomModifier, SignatureField, SignatureLocalVariables,
        SignatureMethod, SignatureMethodSpec, SignatureProperty, TypeSignature,
        CALLING_CONVENTION, ELEMENT_TYPE, SIGNATURE_HEADER,
    },
    Error::RecursionLimit,
    Result,
};

/// Maximum nesting depth of a signature
pub const MAX_RECURSION_DEPTH: usize = 50;

/// Parser for every signature kind of ECMA-335 II.23.2
///
/// # Example
///
/// ```rust
/// use cilmerge::metadata::signatures::{SignatureParser, TypeSignature};
/// let data = &[0x20, 0x01, 0x01, 0x0E];
/// let mut parser = SignatureParser::new(data);
/// let sig = parser.parse_method_signature()?;
/// assert!(sig.has_this);
/// assert_eq!(sig.params, vec![TypeSignature::String]);
/// # Ok::<(), cilmerge::Error>(())
/// ```
///
/// A parser instance reads exactly one signature; construct a new one per blob.
pub struct SignatureParser<'a> {
    parser: Parser<'a>,
    depth: usize,
}

impl<'a> SignatureParser<'a> {
    /// Create a new `SignatureParser` from a byte slice
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        SignatureParser {
            parser: Parser::new(data),
            depth: 0,
        }
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth >= MAX_RECURSION_DEPTH {
            return Err(RecursionLimit(MAX_RECURSION_DEPTH));
        }
        Ok(())
    }

    /// Parse a single type, including leading custom modifiers, `byref` and `pinned`
    fn parse_type(&mut self) -> Result<TypeSignature> {
        self.enter()?;
        let parsed = self.parse_type_inner();
        self.depth -= 1;
        parsed
    }

    fn parse_type_inner(&mut self) -> Result<TypeSignature> {
        let current_byte = self.parser.read_le::<u8>()?;
        match current_byte {
            ELEMENT_TYPE::VOID => Ok(TypeSignature::Void),
            ELEMENT_TYPE::BOOLEAN => Ok(TypeSignature::Boolean),
            ELEMENT_TYPE::CHAR => Ok(TypeSignature::Char),
            ELEMENT_TYPE::I1 => Ok(TypeSignature::I1),
            ELEMENT_TYPE::U1 => Ok(TypeSignature::U1),
            ELEMENT_TYPE::I2 => Ok(TypeSignature::I2),
            ELEMENT_TYPE::U2 => Ok(TypeSignature::U2),
            ELEMENT_TYPE::I4 => Ok(TypeSignature::I4),
            ELEMENT_TYPE::U4 => Ok(TypeSignature::U4),
            ELEMENT_TYPE::I8 => Ok(TypeSignature::I8),
            ELEMENT_TYPE::U8 => Ok(TypeSignature::U8),
            ELEMENT_TYPE::R4 => Ok(TypeSignature::R4),
            ELEMENT_TYPE::R8 => Ok(TypeSignature::R8),
            ELEMENT_TYPE::STRING => Ok(TypeSignature::String),
            ELEMENT_TYPE::PTR => Ok(TypeSignature::Ptr(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::BYREF => Ok(TypeSignature::ByRef(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::VALUETYPE => Ok(TypeSignature::ValueType(
                self.parser.read_compressed_token()?,
            )),
            ELEMENT_TYPE::CLASS => Ok(TypeSignature::Class(self.parser.read_compressed_token()?)),
            ELEMENT_TYPE::VAR => Ok(TypeSignature::Var(self.parser.read_compressed_uint()?)),
            ELEMENT_TYPE::ARRAY => {
                let element = self.parse_type()?;
                let rank = self.parser.read_compressed_uint()?;

                let size_count = self.parser.read_compressed_uint()?;
                let mut sizes = Vec::with_capacity(size_count.min(64) as usize);
                for _ in 0..size_count {
                    sizes.push(self.parser.read_compressed_uint()?);
                }

                let bound_count = self.parser.read_compressed_uint()?;
                let mut lower_bounds = Vec::with_capacity(bound_count.min(64) as usize);
                for _ in 0..bound_count {
                    lower_bounds.push(self.parser.read_compressed_int()?);
                }

                Ok(TypeSignature::Array(
                    Box::new(element),
                    ArrayShape {
                        rank,
                        sizes,
                        lower_bounds,
                    },
                ))
            }
            ELEMENT_TYPE::GENERICINST => {
                let is_value_type = match self.parser.read_le::<u8>()? {
                    ELEMENT_TYPE::CLASS => false,
                    ELEMENT_TYPE::VALUETYPE => true,
                    other => {
                        return Err(malformed_error!(
                            "GENERICINST - next byte is not CLASS or VALUETYPE - {}",
                            other
                        ))
                    }
                };

                let generic = self.parser.read_compressed_token()?;
                let arg_count = self.parser.read_compressed_uint()?;
                let mut args = Vec::with_capacity(arg_count.min(64) as usize);
                for _ in 0..arg_count {
                    args.push(self.parse_type()?);
                }

                Ok(TypeSignature::GenericInst {
                    is_value_type,
                    generic,
                    args,
                })
            }
            ELEMENT_TYPE::TYPEDBYREF => Ok(TypeSignature::TypedByRef),
            ELEMENT_TYPE::I => Ok(TypeSignature::I),
            ELEMENT_TYPE::U => Ok(TypeSignature::U),
            ELEMENT_TYPE::FNPTR => Ok(TypeSignature::FnPtr(Box::new(self.parse_method()?))),
            ELEMENT_TYPE::OBJECT => Ok(TypeSignature::Object),
            ELEMENT_TYPE::SZARRAY => Ok(TypeSignature::SzArray(Box::new(self.parse_type()?))),
            ELEMENT_TYPE::MVAR => Ok(TypeSignature::MVar(self.parser.read_compressed_uint()?)),
            ELEMENT_TYPE::CMOD_REQD | ELEMENT_TYPE::CMOD_OPT => {
                let modifier = CustomModifier {
                    required: current_byte == ELEMENT_TYPE::CMOD_REQD,
                    modifier: self.parser.read_compressed_token()?,
                };
                Ok(TypeSignature::Modified(
                    modifier,
                    Box::new(self.parse_type()?),
                ))
            }
            ELEMENT_TYPE::INTERNAL => Ok(TypeSignature::Internal),
            ELEMENT_TYPE::PINNED => Ok(TypeSignature::Pinned(Box::new(self.parse_type()?))),
            _ => Err(malformed_error!(
                "Unsupported ELEMENT_TYPE - {} at offset {}",
                current_byte,
                self.parser.pos() - 1
            )),
        }
    }

    fn parse_method(&mut self) -> Result<SignatureMethod> {
        self.enter()?;

        let convention_byte = self.parser.read_le::<u8>()?;
        let Some(calling_convention) =
            CallingConvention::from_bits(convention_byte & CALLING_CONVENTION::KIND_MASK)
        else {
            return Err(malformed_error!(
                "Invalid calling convention - 0x{:02x}",
                convention_byte
            ));
        };

        let generic_param_count = if convention_byte & CALLING_CONVENTION::GENERIC != 0 {
            self.parser.read_compressed_uint()?
        } else {
            0
        };

        let param_count = self.parser.read_compressed_uint()?;
        let return_type = self.parse_type()?;

        let mut params = Vec::with_capacity(param_count.min(64) as usize);
        let mut varargs = Vec::new();
        let mut after_sentinel = false;
        for _ in 0..param_count {
            if self.parser.peek_byte()? == ELEMENT_TYPE::SENTINEL {
                self.parser.advance_by(1)?;
                after_sentinel = true;
            }

            let param = self.parse_type()?;
            if after_sentinel {
                varargs.push(param);
            } else {
                params.push(param);
            }
        }

        self.depth -= 1;
        Ok(SignatureMethod {
            has_this: convention_byte & CALLING_CONVENTION::HASTHIS != 0,
            explicit_this: convention_byte & CALLING_CONVENTION::EXPLICITTHIS != 0,
            calling_convention,
            generic_param_count,
            return_type,
            params,
            varargs,
        })
    }

    fn finish<T>(&self, value: T) -> Result<T> {
        if self.parser.has_more_data() {
            return Err(malformed_error!(
                "Signature has {} trailing bytes",
                self.parser.remaining()
            ));
        }
        Ok(value)
    }

    /// Parse a method signature (`MethodDef`, `MemberRef`, `StandAloneSig`)
    ///
    /// # Errors
    /// Returns an error if the signature is malformed or nests too deeply
    pub fn parse_method_signature(&mut self) -> Result<SignatureMethod> {
        let method = self.parse_method()?;
        self.finish(method)
    }

    /// Parse a field signature
    ///
    /// # Errors
    /// Returns an error if the signature is malformed or nests too deeply
    pub fn parse_field_signature(&mut self) -> Result<SignatureField> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::FIELD {
            return Err(malformed_error!(
                "SignatureField - invalid start - {}",
                head_byte
            ));
        }

        let field_type = self.parse_type()?;
        self.finish(SignatureField { field_type })
    }

    /// Parse a property signature
    ///
    /// # Errors
    /// Returns an error if the signature is malformed or nests too deeply
    pub fn parse_property_signature(&mut self) -> Result<SignatureProperty> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte & !CALLING_CONVENTION::HASTHIS != SIGNATURE_HEADER::PROPERTY {
            return Err(malformed_error!(
                "SignatureProperty - invalid start - {}",
                head_byte
            ));
        }

        let param_count = self.parser.read_compressed_uint()?;
        let property_type = self.parse_type()?;

        let mut params = Vec::with_capacity(param_count.min(64) as usize);
        for _ in 0..param_count {
            params.push(self.parse_type()?);
        }

        self.finish(SignatureProperty {
            has_this: head_byte & CALLING_CONVENTION::HASTHIS != 0,
            property_type,
            params,
        })
    }

    /// Parse a local variable signature
    ///
    /// # Errors
    /// Returns an error if the signature is malformed or nests too deeply
    pub fn parse_local_var_signature(&mut self) -> Result<SignatureLocalVariables> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::LOCAL_SIG {
            return Err(malformed_error!(
                "SignatureLocalVariables - invalid start - {}",
                head_byte
            ));
        }

        let count = self.parser.read_compressed_uint()?;
        let mut locals = Vec::with_capacity(count.min(256) as usize);
        for _ in 0..count {
            locals.push(self.parse_type()?);
        }

        self.finish(SignatureLocalVariables { locals })
    }

    /// Parse a type specification
    ///
    /// # Errors
    /// Returns an error if the signature is malformed or nests too deeply
    pub fn parse_type_spec_signature(&mut self) -> Result<TypeSignature> {
        let spec = self.parse_type()?;
        self.finish(spec)
    }

    /// Parse a generic method instantiation
    ///
    /// # Errors
    /// Returns an error if the signature is malformed or nests too deeply
    pub fn parse_method_spec_signature(&mut self) -> Result<SignatureMethodSpec> {
        let head_byte = self.parser.read_le::<u8>()?;
        if head_byte != SIGNATURE_HEADER::METHOD_SPEC {
            return Err(malformed_error!(
                "SignatureMethodSpec - invalid start - {}",
                head_byte
            ));
        }

        let count = self.parser.read_compressed_uint()?;
        let mut generic_args = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            generic_args.push(self.parse_type()?);
        }

        self.finish(SignatureMethodSpec { generic_args })
    }
}
