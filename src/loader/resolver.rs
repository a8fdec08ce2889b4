//! Resource resolution: how textual resource identifiers become byte streams, and which
//! resources may satisfy a module or assembly reference.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        RwLock,
    },
};

use crate::{
    file::{memory::Memory, physical::Physical, Backend},
    metadata::{
        flags::AssemblyFlags,
        tables::{columns::assemblyref, Blob, Row},
    },
    Error, Result,
};

/// The opened content of a resource
pub struct ResourceStream {
    backend: Box<dyn Backend>,
}

impl ResourceStream {
    /// Memory-map a file
    ///
    /// # Errors
    /// Returns [`Error::Io`] naming the path if it cannot be opened
    pub fn map(path: &Path) -> Result<ResourceStream> {
        Ok(ResourceStream {
            backend: Box::new(Physical::new(path)?),
        })
    }

    /// Wrap bytes that are already in memory
    #[must_use]
    pub fn from_bytes(data: Vec<u8>) -> ResourceStream {
        ResourceStream {
            backend: Box::new(Memory::new(data)),
        }
    }

    /// The content
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.backend.data()
    }

    pub(crate) fn into_backend(self) -> Box<dyn Backend> {
        self.backend
    }
}

impl fmt::Debug for ResourceStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceStream")
            .field("len", &self.backend.len())
            .finish()
    }
}

/// The identity an `AssemblyRef` row asks for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssemblyName {
    /// Simple name
    pub name: String,
    /// Major, minor, build and revision numbers
    pub version: [u16; 4],
    /// Culture, empty for neutral
    pub culture: String,
    /// Full public key or its 8-byte token, see [`AssemblyName::has_full_key`]
    pub public_key_or_token: Vec<u8>,
    /// `AssemblyRef.Flags`
    pub flags: AssemblyFlags,
}

impl AssemblyName {
    /// The name an `AssemblyRef` row describes
    ///
    /// # Errors
    /// Returns an error if `row` is not an `AssemblyRef` row
    pub fn from_assembly_ref(row: &Row) -> Result<AssemblyName> {
        let mut version = [0_u16; 4];
        for (slot, column) in version.iter_mut().zip([
            assemblyref::MAJOR_VERSION,
            assemblyref::MINOR_VERSION,
            assemblyref::BUILD_NUMBER,
            assemblyref::REVISION_NUMBER,
        ]) {
            *slot = (row.int(column)? & 0xFFFF) as u16;
        }

        let public_key_or_token = match row.blob(assemblyref::PUBLIC_KEY_OR_TOKEN)? {
            Blob::Bytes(bytes) => bytes.clone(),
            _ => Vec::new(),
        };

        Ok(AssemblyName {
            name: row.string(assemblyref::NAME)?.to_string(),
            version,
            culture: row.string(assemblyref::CULTURE)?.to_string(),
            public_key_or_token,
            flags: AssemblyFlags::from_bits_retain(row.int(assemblyref::FLAGS)?),
        })
    }

    /// Whether the key column holds a full public key instead of a token
    #[must_use]
    pub fn has_full_key(&self) -> bool {
        self.flags.contains(AssemblyFlags::PUBLIC_KEY)
    }

    /// Whether the reference may be satisfied by another assembly at run time
    #[must_use]
    pub fn is_retargetable(&self) -> bool {
        self.flags.contains(AssemblyFlags::RETARGETABLE)
    }
}

impl fmt::Display for AssemblyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [major, minor, build, revision] = self.version;
        write!(
            f,
            "{}, Version={major}.{minor}.{build}.{revision}, Culture={}",
            self.name,
            if self.culture.is_empty() {
                "neutral"
            } else {
                &self.culture
            }
        )?;
        if !self.has_full_key() {
            if self.public_key_or_token.is_empty() {
                f.write_str(", PublicKeyToken=null")?;
            } else {
                f.write_str(", PublicKeyToken=")?;
                for byte in &self.public_key_or_token {
                    write!(f, "{byte:02x}")?;
                }
            }
        }
        Ok(())
    }
}

/// Maps resource identifiers to content and enumerates candidates for references.
///
/// The loader calls [`ResourceResolver::sanitize`] on every identifier before it touches the
/// cache, so two spellings of one resource share a cache entry.
pub trait ResourceResolver: Send + Sync {
    /// The canonical spelling of `resource`
    fn sanitize(&self, resource: &str) -> String;

    /// Whether `resource` exists and may be opened
    fn is_valid(&self, resource: &str) -> bool;

    /// Open `resource`.
    ///
    /// # Errors
    /// Returns an I/O error naming the resource if it cannot be read
    fn open_stream(&self, resource: &str) -> Result<ResourceStream>;

    /// Resources that may hold the module `module_name` referenced from `referrer`
    fn module_reference_candidates(&self, referrer: &str, module_name: &str) -> Vec<String>;

    /// Resources that may hold `assembly` referenced from `referrer`
    fn assembly_reference_candidates(
        &self,
        referrer: &str,
        assembly: &AssemblyName,
        search_directories: &[PathBuf],
    ) -> Vec<String>;
}

/// Resolves resources as file system paths
#[derive(Debug, Clone, Default)]
pub struct FileSystemResolver;

impl FileSystemResolver {
    fn directory_of(referrer: &str) -> PathBuf {
        Path::new(referrer)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

impl ResourceResolver for FileSystemResolver {
    fn sanitize(&self, resource: &str) -> String {
        std::fs::canonicalize(resource).map_or_else(
            |_| resource.to_string(),
            |path| path.to_string_lossy().into_owned(),
        )
    }

    fn is_valid(&self, resource: &str) -> bool {
        Path::new(resource).is_file()
    }

    fn open_stream(&self, resource: &str) -> Result<ResourceStream> {
        ResourceStream::map(Path::new(resource))
    }

    fn module_reference_candidates(&self, referrer: &str, module_name: &str) -> Vec<String> {
        vec![Self::directory_of(referrer)
            .join(module_name)
            .to_string_lossy()
            .into_owned()]
    }

    fn assembly_reference_candidates(
        &self,
        referrer: &str,
        assembly: &AssemblyName,
        search_directories: &[PathBuf],
    ) -> Vec<String> {
        let mut directories = vec![Self::directory_of(referrer)];
        directories.extend(search_directories.iter().cloned());

        let mut candidates = Vec::new();
        for directory in directories {
            for extension in ["dll", "exe"] {
                candidates.push(
                    directory
                        .join(format!("{}.{extension}", assembly.name))
                        .to_string_lossy()
                        .into_owned(),
                );
            }
        }
        candidates
    }
}

/// Resolves resources from a name to bytes map; useful for tests and embedding hosts.
///
/// Reference candidates are `<name>` for modules and `<name>.dll` for assemblies.
#[derive(Debug, Default)]
pub struct MemoryResolver {
    resources: RwLock<HashMap<String, Vec<u8>>>,
    opened: AtomicUsize,
}

impl MemoryResolver {
    /// An empty resolver
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a resource
    ///
    /// # Errors
    /// Returns [`Error::LockError`] if the map is poisoned
    pub fn insert(&self, name: impl Into<String>, data: Vec<u8>) -> Result<()> {
        write_lock!(self.resources)?.insert(name.into(), data);
        Ok(())
    }

    /// How many times a resource has been opened
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::Relaxed)
    }
}

impl ResourceResolver for MemoryResolver {
    fn sanitize(&self, resource: &str) -> String {
        resource.trim().to_string()
    }

    fn is_valid(&self, resource: &str) -> bool {
        read_lock!(self.resources).is_ok_and(|resources| resources.contains_key(resource))
    }

    fn open_stream(&self, resource: &str) -> Result<ResourceStream> {
        let data = read_lock!(self.resources)?
            .get(resource)
            .cloned()
            .ok_or_else(|| Error::Io {
                path: PathBuf::from(resource),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })?;
        self.opened.fetch_add(1, Ordering::Relaxed);
        Ok(ResourceStream::from_bytes(data))
    }

    fn module_reference_candidates(&self, _referrer: &str, module_name: &str) -> Vec<String> {
        vec![module_name.to_string()]
    }

    fn assembly_reference_candidates(
        &self,
        _referrer: &str,
        assembly: &AssemblyName,
        _search_directories: &[PathBuf],
    ) -> Vec<String> {
        vec![format!("{}.dll", assembly.name)]
    }
}
