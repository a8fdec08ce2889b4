//! Reflection-style type names as stored in custom attribute and permission blobs.
//!
//! ```text
//! Outer+Inner`1[[Arg, ArgAssembly],Other][]*, Assembly, Version=1.0.0.0, Culture=neutral
//! ```
//!
//! A name consists of the (possibly nested, `+`-separated) type name, optional generic
//! arguments (bracketed when assembly-qualified), array/pointer/by-ref suffixes and an
//! optional assembly name. Special characters inside names are escaped with `\`.

use std::fmt;

use crate::Result;

/// A generic argument of a [`TypeNameSpec`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericArgument {
    /// The argument type
    pub spec: TypeNameSpec,
    /// Whether the argument was written in brackets, as required for qualified arguments
    pub bracketed: bool,
}

/// A parsed type name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeNameSpec {
    /// Namespace-qualified name, nested types separated by `+`, escapes preserved
    pub name: String,
    /// Generic arguments
    pub generic_args: Vec<GenericArgument>,
    /// Array, pointer and by-ref suffixes, verbatim
    pub suffix: String,
    /// The assembly display name, if qualified
    pub assembly: Option<String>,
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    text: &'a str,
}

impl Cursor<'_> {
    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn next(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.next();
        }
    }

    fn expect(&mut self, wanted: char) -> Result<()> {
        match self.next() {
            Some(found) if found == wanted => Ok(()),
            found => Err(malformed_error!(
                "Type name '{}': expected '{}', found {:?}",
                self.text,
                wanted,
                found
            )),
        }
    }
}

impl TypeNameSpec {
    /// Parse a type name.
    ///
    /// # Errors
    /// Returns an error for unbalanced brackets, an empty name or trailing characters
    pub fn parse(text: &str) -> Result<TypeNameSpec> {
        let mut cursor = Cursor {
            chars: text.chars().peekable(),
            text,
        };
        let spec = parse_spec(&mut cursor, false)?;
        if cursor.peek().is_some() {
            return Err(malformed_error!("Type name '{}' has trailing characters", text));
        }
        Ok(spec)
    }

    /// The simple name of the assembly qualification
    #[must_use]
    pub fn assembly_name(&self) -> Option<&str> {
        self.assembly
            .as_deref()
            .map(|assembly| assembly.split(',').next().unwrap_or(assembly).trim())
    }

    /// Visit this name and every generic argument, innermost arguments first.
    ///
    /// `f` receives the type name and the assembly qualification and may rewrite both.
    pub fn rewrite(&mut self, f: &mut dyn FnMut(&mut String, &mut Option<String>)) {
        for arg in &mut self.generic_args {
            arg.spec.rewrite(f);
        }
        f(&mut self.name, &mut self.assembly);
    }
}

fn parse_spec(cursor: &mut Cursor<'_>, in_brackets: bool) -> Result<TypeNameSpec> {
    cursor.skip_spaces();
    let mut name = String::new();
    while let Some(c) = cursor.peek() {
        match c {
            '\\' => {
                name.push(c);
                cursor.next();
                match cursor.next() {
                    Some(escaped) => name.push(escaped),
                    None => {
                        return Err(malformed_error!(
                            "Type name '{}' ends in an escape",
                            cursor.text
                        ))
                    }
                }
            }
            '[' | ']' | ',' | '*' | '&' => break,
            _ => {
                name.push(c);
                cursor.next();
            }
        }
    }
    let name = name.trim_end().to_string();
    if name.is_empty() {
        return Err(malformed_error!("Type name '{}' is empty", cursor.text));
    }

    let mut generic_args = Vec::new();
    let mut suffix = String::new();
    loop {
        match cursor.peek() {
            Some('*' | '&') => {
                if let Some(c) = cursor.next() {
                    suffix.push(c);
                }
            }
            Some('[') => {
                cursor.next();
                match cursor.peek() {
                    Some(']' | ',' | '*') => {
                        suffix.push('[');
                        loop {
                            match cursor.next() {
                                Some(']') => break,
                                Some(c) => suffix.push(c),
                                None => {
                                    return Err(malformed_error!(
                                        "Type name '{}' has an unclosed array suffix",
                                        cursor.text
                                    ))
                                }
                            }
                        }
                        suffix.push(']');
                    }
                    _ if generic_args.is_empty() && suffix.is_empty() => {
                        generic_args = parse_generic_args(cursor)?;
                    }
                    _ => {
                        return Err(malformed_error!(
                            "Type name '{}' has misplaced generic arguments",
                            cursor.text
                        ))
                    }
                }
            }
            _ => break,
        }
    }

    let assembly = if cursor.peek() == Some(',') {
        cursor.next();
        let mut assembly = String::new();
        while let Some(c) = cursor.peek() {
            if in_brackets && c == ']' {
                break;
            }
            assembly.push(c);
            cursor.next();
        }
        Some(assembly.trim().to_string())
    } else {
        None
    };

    Ok(TypeNameSpec {
        name,
        generic_args,
        suffix,
        assembly,
    })
}

fn parse_generic_args(cursor: &mut Cursor<'_>) -> Result<Vec<GenericArgument>> {
    let mut args = Vec::new();
    loop {
        cursor.skip_spaces();
        let arg = if cursor.peek() == Some('[') {
            cursor.next();
            let spec = parse_spec(cursor, true)?;
            cursor.expect(']')?;
            GenericArgument {
                spec,
                bracketed: true,
            }
        } else {
            GenericArgument {
                spec: parse_unqualified(cursor)?,
                bracketed: false,
            }
        };
        args.push(arg);

        cursor.skip_spaces();
        match cursor.next() {
            Some(',') => continue,
            Some(']') => return Ok(args),
            found => {
                return Err(malformed_error!(
                    "Type name '{}': unexpected {:?} in generic arguments",
                    cursor.text,
                    found
                ))
            }
        }
    }
}

fn parse_unqualified(cursor: &mut Cursor<'_>) -> Result<TypeNameSpec> {
    let mut nested = String::new();
    let mut depth = 0_usize;
    while let Some(c) = cursor.peek() {
        match c {
            '[' => depth += 1,
            ']' if depth == 0 => break,
            ']' => depth -= 1,
            ',' if depth == 0 => break,
            _ => {}
        }
        nested.push(c);
        cursor.next();
    }
    TypeNameSpec::parse(nested.trim())
}

impl fmt::Display for TypeNameSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.generic_args.is_empty() {
            f.write_str("[")?;
            for (position, arg) in self.generic_args.iter().enumerate() {
                if position > 0 {
                    f.write_str(",")?;
                }
                if arg.bracketed {
                    write!(f, "[{}]", arg.spec)?;
                } else {
                    write!(f, "{}", arg.spec)?;
                }
            }
            f.write_str("]")?;
        }
        f.write_str(&self.suffix)?;
        if let Some(assembly) = &self.assembly {
            write!(f, ", {assembly}")?;
        }
        Ok(())
    }
}

/// Split a namespace-qualified name into namespace and name at the last `.` outside of
/// the first nesting level
#[must_use]
pub fn split_full_name(full_name: &str) -> (&str, &str) {
    let outer_end = full_name.find('+').unwrap_or(full_name.len());
    match full_name[..outer_end].rfind('.') {
        Some(dot) => (&full_name[..dot], &full_name[dot + 1..]),
        None => ("", full_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_and_qualified() {
        let spec = TypeNameSpec::parse("N.C").unwrap();
        assert_eq!(spec.name, "N.C");
        assert_eq!(spec.assembly, None);

        let spec = TypeNameSpec::parse("N.C+D, Lib, Version=1.0.0.0, Culture=neutral").unwrap();
        assert_eq!(spec.name, "N.C+D");
        assert_eq!(spec.assembly_name(), Some("Lib"));
        assert_eq!(
            spec.to_string(),
            "N.C+D, Lib, Version=1.0.0.0, Culture=neutral"
        );
    }

    #[test]
    fn generics_and_suffixes() {
        let text = "System.Collections.Generic.Dictionary`2[[N.K, Lib],System.Int32][]*, mscorlib";
        let spec = TypeNameSpec::parse(text).unwrap();
        assert_eq!(spec.generic_args.len(), 2);
        assert!(spec.generic_args[0].bracketed);
        assert_eq!(spec.generic_args[0].spec.assembly_name(), Some("Lib"));
        assert_eq!(spec.generic_args[1].spec.name, "System.Int32");
        assert_eq!(spec.suffix, "[]*");
        assert_eq!(spec.to_string(), text);
    }

    #[test]
    fn rewrite_assemblies() {
        let mut spec = TypeNameSpec::parse("G`1[[N.C, Lib]], Lib").unwrap();
        spec.rewrite(&mut |name, assembly| {
            if assembly.as_deref() == Some("Lib") {
                *assembly = Some("Merged".to_string());
                if name == "N.C" {
                    *name = "N.C_1".to_string();
                }
            }
        });
        assert_eq!(spec.to_string(), "G`1[[N.C_1, Merged]], Merged");
    }

    #[test]
    fn escapes_and_errors() {
        let spec = TypeNameSpec::parse(r"N.A\,B, Lib").unwrap();
        assert_eq!(spec.name, r"N.A\,B");
        assert_eq!(spec.assembly_name(), Some("Lib"));

        assert!(TypeNameSpec::parse("").is_err());
        assert!(TypeNameSpec::parse("G`1[[N.C, Lib]").is_err());
        assert!(TypeNameSpec::parse("N.C[").is_err());
    }

    #[test]
    fn split_names() {
        assert_eq!(split_full_name("N.M.C"), ("N.M", "C"));
        assert_eq!(split_full_name("C"), ("", "C"));
        assert_eq!(split_full_name("N.Outer+In.ner"), ("N", "Outer+In.ner"));
    }
}
