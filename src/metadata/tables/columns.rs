//! Column positions of the fixed tables, in ECMA-335 II.22 order.
#![allow(missing_docs)]

pub mod module {
    pub const GENERATION: usize = 0;
    pub const NAME: usize = 1;
    pub const MVID: usize = 2;
    pub const ENC_ID: usize = 3;
    pub const ENC_BASE_ID: usize = 4;
}

pub mod typeref {
    pub const RESOLUTION_SCOPE: usize = 0;
    pub const TYPE_NAME: usize = 1;
    pub const TYPE_NAMESPACE: usize = 2;
}

pub mod typedef {
    pub const FLAGS: usize = 0;
    pub const TYPE_NAME: usize = 1;
    pub const TYPE_NAMESPACE: usize = 2;
    pub const EXTENDS: usize = 3;
    pub const FIELD_LIST: usize = 4;
    pub const METHOD_LIST: usize = 5;
}

pub mod fieldptr {
    pub const FIELD: usize = 0;
}

pub mod field {
    pub const FLAGS: usize = 0;
    pub const NAME: usize = 1;
    pub const SIGNATURE: usize = 2;
}

pub mod methodptr {
    pub const METHOD: usize = 0;
}

pub mod methoddef {
    pub const RVA: usize = 0;
    pub const IMPL_FLAGS: usize = 1;
    pub const FLAGS: usize = 2;
    pub const NAME: usize = 3;
    pub const SIGNATURE: usize = 4;
    pub const PARAM_LIST: usize = 5;
}

pub mod paramptr {
    pub const PARAM: usize = 0;
}

pub mod param {
    pub const FLAGS: usize = 0;
    pub const SEQUENCE: usize = 1;
    pub const NAME: usize = 2;
}

pub mod interfaceimpl {
    pub const CLASS: usize = 0;
    pub const INTERFACE: usize = 1;
}

pub mod memberref {
    pub const CLASS: usize = 0;
    pub const NAME: usize = 1;
    pub const SIGNATURE: usize = 2;
}

pub mod constant {
    pub const TYPE: usize = 0;
    pub const PADDING: usize = 1;
    pub const PARENT: usize = 2;
    pub const VALUE: usize = 3;
}

pub mod customattribute {
    pub const PARENT: usize = 0;
    pub const TYPE: usize = 1;
    pub const VALUE: usize = 2;
}

pub mod fieldmarshal {
    pub const PARENT: usize = 0;
    pub const NATIVE_TYPE: usize = 1;
}

pub mod declsecurity {
    pub const ACTION: usize = 0;
    pub const PARENT: usize = 1;
    pub const PERMISSION_SET: usize = 2;
}

pub mod classlayout {
    pub const PACKING_SIZE: usize = 0;
    pub const CLASS_SIZE: usize = 1;
    pub const PARENT: usize = 2;
}

pub mod fieldlayout {
    pub const OFFSET: usize = 0;
    pub const FIELD: usize = 1;
}

pub mod standalonesig {
    pub const SIGNATURE: usize = 0;
}

pub mod eventmap {
    pub const PARENT: usize = 0;
    pub const EVENT_LIST: usize = 1;
}

pub mod eventptr {
    pub const EVENT: usize = 0;
}

pub mod event {
    pub const FLAGS: usize = 0;
    pub const NAME: usize = 1;
    pub const EVENT_TYPE: usize = 2;
}

pub mod propertymap {
    pub const PARENT: usize = 0;
    pub const PROPERTY_LIST: usize = 1;
}

pub mod propertyptr {
    pub const PROPERTY: usize = 0;
}

pub mod property {
    pub const FLAGS: usize = 0;
    pub const NAME: usize = 1;
    pub const TYPE: usize = 2;
}

pub mod methodsemantics {
    pub const SEMANTICS: usize = 0;
    pub const METHOD: usize = 1;
    pub const ASSOCIATION: usize = 2;
}

pub mod methodimpl {
    pub const CLASS: usize = 0;
    pub const METHOD_BODY: usize = 1;
    pub const METHOD_DECLARATION: usize = 2;
}

pub mod moduleref {
    pub const NAME: usize = 0;
}

pub mod typespec {
    pub const SIGNATURE: usize = 0;
}

pub mod implmap {
    pub const MAPPING_FLAGS: usize = 0;
    pub const MEMBER_FORWARDED: usize = 1;
    pub const IMPORT_NAME: usize = 2;
    pub const IMPORT_SCOPE: usize = 3;
}

pub mod fieldrva {
    pub const RVA: usize = 0;
    pub const FIELD: usize = 1;
}

pub mod enclog {
    pub const TOKEN: usize = 0;
    pub const FUNC_CODE: usize = 1;
}

pub mod encmap {
    pub const TOKEN: usize = 0;
}

pub mod assembly {
    pub const HASH_ALG_ID: usize = 0;
    pub const MAJOR_VERSION: usize = 1;
    pub const MINOR_VERSION: usize = 2;
    pub const BUILD_NUMBER: usize = 3;
    pub const REVISION_NUMBER: usize = 4;
    pub const FLAGS: usize = 5;
    pub const PUBLIC_KEY: usize = 6;
    pub const NAME: usize = 7;
    pub const CULTURE: usize = 8;
}

pub mod assemblyprocessor {
    pub const PROCESSOR: usize = 0;
}

pub mod assemblyos {
    pub const OS_PLATFORM_ID: usize = 0;
    pub const OS_MAJOR_VERSION: usize = 1;
    pub const OS_MINOR_VERSION: usize = 2;
}

pub mod assemblyref {
    pub const MAJOR_VERSION: usize = 0;
    pub const MINOR_VERSION: usize = 1;
    pub const BUILD_NUMBER: usize = 2;
    pub const REVISION_NUMBER: usize = 3;
    pub const FLAGS: usize = 4;
    pub const PUBLIC_KEY_OR_TOKEN: usize = 5;
    pub const NAME: usize = 6;
    pub const CULTURE: usize = 7;
    pub const HASH_VALUE: usize = 8;
}

pub mod assemblyrefprocessor {
    pub const PROCESSOR: usize = 0;
    pub const ASSEMBLY_REF: usize = 1;
}

pub mod assemblyrefos {
    pub const OS_PLATFORM_ID: usize = 0;
    pub const OS_MAJOR_VERSION: usize = 1;
    pub const OS_MINOR_VERSION: usize = 2;
    pub const ASSEMBLY_REF: usize = 3;
}

pub mod file {
    pub const FLAGS: usize = 0;
    pub const NAME: usize = 1;
    pub const HASH_VALUE: usize = 2;
}

pub mod exportedtype {
    pub const FLAGS: usize = 0;
    pub const TYPE_DEF_ID: usize = 1;
    pub const TYPE_NAME: usize = 2;
    pub const TYPE_NAMESPACE: usize = 3;
    pub const IMPLEMENTATION: usize = 4;
}

pub mod manifestresource {
    pub const OFFSET: usize = 0;
    pub const FLAGS: usize = 1;
    pub const NAME: usize = 2;
    pub const IMPLEMENTATION: usize = 3;
}

pub mod nestedclass {
    pub const NESTED_CLASS: usize = 0;
    pub const ENCLOSING_CLASS: usize = 1;
}

pub mod genericparam {
    pub const NUMBER: usize = 0;
    pub const FLAGS: usize = 1;
    pub const OWNER: usize = 2;
    pub const NAME: usize = 3;
}

pub mod methodspec {
    pub const METHOD: usize = 0;
    pub const INSTANTIATION: usize = 1;
}

pub mod genericparamconstraint {
    pub const OWNER: usize = 0;
    pub const CONSTRAINT: usize = 1;
}
