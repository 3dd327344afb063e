//! LibXML2 FFI wrapper
//!
//! The Rust ecosystem has no mature XML Schema validator (`roxmltree` and `quick-xml`
//! parse, nothing validates), so schema compilation and validation are delegated to
//! libxml2 through direct FFI.
//!
//! ## Resolution bridge
//!
//! libxml2 loads every external resource (imported and included schema documents, DTDs,
//! the document itself) through one process-global external entity loader. We install
//! [`catalog_entity_loader`] once; it forwards each request to the [`ResourceResolver`]
//! installed on the *calling thread* by a [`ResolverGuard`]. Independent runs on
//! different threads therefore never see each other's catalogs.
//!
//! The loader never touches the network: unresolved `http:`/`ftp:` references fail
//! and libxml2 reports them as diagnostics. I/O failures from the resolver cannot
//! cross the C boundary, so they are parked in a thread-local slot and picked up with
//! [`ResolverGuard::take_failure`] after the libxml2 call returns.
//!
//! ## Thread safety
//!
//! - Schema parsing is serialized behind a process-wide lock.
//! - Validation runs without locking; each call owns its validation context.
//! - Compiled schemas are read-only and shared through `Arc`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::path::Path;
use std::ptr;
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int, c_uint, c_void};
use tracing::debug;
use url::Url;

use crate::catalog::local_path;
use crate::error::{LibXml2Error, LibXml2Result, Result, ValidationError};
use crate::error_reporter::{Diagnostic, Severity, SourceLocator};
use crate::resolver::{ResourceResolver, SchemaResourceRequest, XML_SCHEMA_TYPE};

static LIBXML2_INIT: Once = Once::new();

/// libxml2's schema parser is not safe to run concurrently
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

/// `XML_PARSE_NONET`: forbid network access while parsing
const XML_PARSE_NONET: c_int = 1 << 11;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlParserInput {
    _private: [u8; 0],
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    /// Column number, when known
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

pub type XmlExternalEntityLoader = Option<
    unsafe extern "C" fn(
        url: *const c_char,
        id: *const c_char,
        context: *mut XmlParserCtxt,
    ) -> *mut XmlParserInput,
>;

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();

    // Resource loading
    pub fn xmlSetExternalEntityLoader(f: XmlExternalEntityLoader);
    pub fn xmlNewInputFromFile(
        ctxt: *mut XmlParserCtxt,
        filename: *const c_char,
    ) -> *mut XmlParserInput;

    // Document parsing
    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);
    pub fn xmlReadFile(url: *const c_char, encoding: *const c_char, options: c_int)
    -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    // Schema parsing
    pub fn xmlSchemaNewMemParserCtxt(
        buffer: *const c_char,
        size: c_int,
    ) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaValidateFile(
        ctxt: *const XmlSchemaValidCtxt,
        file_name: *const c_char,
        options: c_uint,
    ) -> c_int;
}

/// What the loader is fetching resources for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPurpose {
    /// Imports and includes met while compiling a schema
    Schema,
    /// Entities met while parsing a document
    Document,
}

struct LoaderScope {
    resolver: Arc<dyn ResourceResolver>,
    purpose: LoadPurpose,
    /// Namespace of each `xs:import` location, keyed by the forms libxml2 may request
    import_namespaces: HashMap<String, String>,
}

thread_local! {
    static CURRENT_LOADER: RefCell<Option<LoaderScope>> = const { RefCell::new(None) };
    static LOADER_FAILURE: RefCell<Option<ValidationError>> = const { RefCell::new(None) };
}

/// Installs a resolver for libxml2 loads on the current thread until dropped
pub struct ResolverGuard {
    previous: Option<LoaderScope>,
    // Tied to the thread whose thread-local it modified.
    _not_send: PhantomData<*const ()>,
}

impl ResolverGuard {
    pub fn install(resolver: Arc<dyn ResourceResolver>, purpose: LoadPurpose) -> Self {
        Self::install_scope(LoaderScope {
            resolver,
            purpose,
            import_namespaces: HashMap::new(),
        })
    }

    /// Install for schema compilation; loads of a known import location carry its
    /// namespace so the resolver can fall back to it
    pub fn install_for_schema(
        resolver: Arc<dyn ResourceResolver>,
        import_namespaces: HashMap<String, String>,
    ) -> Self {
        Self::install_scope(LoaderScope {
            resolver,
            purpose: LoadPurpose::Schema,
            import_namespaces,
        })
    }

    fn install_scope(scope: LoaderScope) -> Self {
        let previous = CURRENT_LOADER.with(|slot| slot.replace(Some(scope)));
        LOADER_FAILURE.with(|failure| failure.replace(None));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }

    /// First resolver failure raised inside libxml2 since the guard was installed
    pub fn take_failure(&self) -> Option<ValidationError> {
        LOADER_FAILURE.with(|failure| failure.replace(None))
    }
}

impl Drop for ResolverGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_LOADER.with(|slot| {
            slot.replace(previous);
        });
    }
}

fn record_loader_failure(error: ValidationError) {
    LOADER_FAILURE.with(|failure| {
        if let Ok(mut slot) = failure.try_borrow_mut()
            && slot.is_none()
        {
            *slot = Some(error);
        }
    });
}

unsafe fn optional_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    let value = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
    (!value.is_empty()).then_some(value)
}

/// A reference libxml2 may read straight from disk
fn is_local_reference(location: &str) -> bool {
    match Url::parse(location) {
        Ok(url) => url.scheme() == "file" || url.scheme().len() == 1,
        Err(_) => true,
    }
}

fn resolve_for_loader(
    scope: &LoaderScope,
    public_id: Option<&str>,
    system_id: Option<&str>,
) -> Result<Option<String>> {
    let resolved = match scope.purpose {
        LoadPurpose::Schema => {
            let request = SchemaResourceRequest {
                resource_type: Some(XML_SCHEMA_TYPE.to_string()),
                namespace_uri: system_id
                    .and_then(|location| scope.import_namespaces.get(location))
                    .cloned(),
                public_id: public_id.map(str::to_string),
                system_id: system_id.map(str::to_string),
                ..SchemaResourceRequest::default()
            };
            scope.resolver.resolve_schema_resource(&request)?
        }
        LoadPurpose::Document => scope.resolver.resolve_entity(public_id, system_id)?,
    };
    Ok(resolved.map(|resource| resource.path().to_string_lossy().into_owned()))
}

/// External entity loader routing every libxml2 load through the thread's resolver
unsafe extern "C" fn catalog_entity_loader(
    url: *const c_char,
    id: *const c_char,
    context: *mut XmlParserCtxt,
) -> *mut XmlParserInput {
    let system_id = unsafe { optional_string(url) };
    let public_id = unsafe { optional_string(id) };

    let resolved = CURRENT_LOADER.with(|slot| {
        let scope = slot.try_borrow().ok()?;
        let scope = scope.as_ref()?;
        Some(resolve_for_loader(
            scope,
            public_id.as_deref(),
            system_id.as_deref(),
        ))
    });

    let location = match resolved {
        Some(Ok(Some(path))) => path,
        Some(Err(error)) => {
            record_loader_failure(error);
            return ptr::null_mut();
        }
        Some(Ok(None)) | None => match system_id {
            Some(system_id) if is_local_reference(&system_id) => local_path(&system_id)
                .map(|path| path.to_string_lossy().into_owned())
                .unwrap_or(system_id),
            Some(system_id) => {
                debug!("refusing to fetch unresolved remote resource {}", system_id);
                return ptr::null_mut();
            }
            None => return ptr::null_mut(),
        },
    };

    match CString::new(location) {
        Ok(c_location) => unsafe { xmlNewInputFromFile(context, c_location.as_ptr()) },
        Err(_) => ptr::null_mut(),
    }
}

unsafe fn diagnostic_from_error(error: &xmlError) -> Option<Diagnostic> {
    let severity = match error.level {
        1 => Severity::Warning,
        2 => Severity::Error,
        3 => Severity::Fatal,
        _ => return None,
    };
    let message = unsafe { optional_string(error.message) }
        .map(|m| m.trim().to_string())
        .unwrap_or_else(|| format!("libxml2 error {} (domain {})", error.code, error.domain));
    let locator = SourceLocator {
        public_id: None,
        system_id: unsafe { optional_string(error.file) },
        line: u32::try_from(error.line).ok().filter(|&l| l > 0),
        column: u32::try_from(error.int2).ok().filter(|&c| c > 0),
    };
    Some(Diagnostic::new(severity, locator, message))
}

/// Callback for libxml2 to report structured errors into a `Vec<Diagnostic>`
unsafe extern "C" fn collect_structured_error(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }
    let diagnostics = unsafe { &mut *(user_data as *mut Vec<Diagnostic>) };
    if let Some(diagnostic) = unsafe { diagnostic_from_error(&*error) } {
        diagnostics.push(diagnostic);
    }
}

/// Routes the thread's generic libxml2 errors into `sink` until dropped
struct GlobalErrorCapture;

impl GlobalErrorCapture {
    unsafe fn install(sink: *mut c_void) -> Self {
        unsafe { xmlSetStructuredErrorFunc(sink, Some(collect_structured_error)) };
        GlobalErrorCapture
    }
}

impl Drop for GlobalErrorCapture {
    fn drop(&mut self) {
        unsafe { xmlSetStructuredErrorFunc(ptr::null_mut(), None) };
    }
}

/// Compiled schema shared across threads, freed when the last clone drops
#[derive(Debug)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: compiled xmlSchema structures are only read during validation.
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// `ptr` must come from `xmlSchemaParse` and must not be freed elsewhere.
    pub(crate) unsafe fn from_raw(ptr: *mut XmlSchema) -> LibXml2Result<Self> {
        if ptr.is_null() {
            return Err(LibXml2Error::InternalError {
                details: "null schema pointer".to_string(),
            });
        }
        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                _phantom: PhantomData,
            }),
        })
    }

    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Clone for XmlSchemaPtr {
    fn clone(&self) -> Self {
        XmlSchemaPtr {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                xmlSchemaFree(self.ptr);
            }
            self.ptr = ptr::null_mut();
        }
    }
}

/// Result of compiling a schema: the schema, if any, and what the compiler reported
#[derive(Debug, Clone)]
pub struct SchemaCompilation {
    pub schema: Option<XmlSchemaPtr>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Result of running libxml2 over one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// libxml2 return code: 0 valid, positive invalid, negative internal error
    pub code: i32,
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.code == 0
    }

    pub fn is_invalid(&self) -> bool {
        self.code > 0
    }

    /// libxml2 failed without telling us why
    pub fn is_error(&self) -> bool {
        self.code < 0 && self.diagnostics.is_empty()
    }
}

/// Safe access to the libxml2 operations the validator needs
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Initializes libxml2 and installs the catalog entity loader, once per process
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlSetExternalEntityLoader(Some(catalog_entity_loader));
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Compile a schema held in memory
    ///
    /// Relative references inside `schema_data` have no base, so imports and includes
    /// must carry absolute locations.
    pub fn parse_schema_from_memory(&self, schema_data: &[u8]) -> LibXml2Result<SchemaCompilation> {
        let size = c_int::try_from(schema_data.len()).map_err(|_| LibXml2Error::InternalError {
            details: format!("schema of {} bytes is too large", schema_data.len()),
        })?;
        let _lock = SCHEMA_PARSE_LOCK
            .lock()
            .map_err(|_| LibXml2Error::InternalError {
                details: "schema parser lock poisoned".to_string(),
            })?;

        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let sink = &mut diagnostics as *mut Vec<Diagnostic> as *mut c_void;

        let schema_ptr = unsafe {
            let parser_ctxt =
                xmlSchemaNewMemParserCtxt(schema_data.as_ptr() as *const c_char, size);
            if parser_ctxt.is_null() {
                return Err(LibXml2Error::MemoryAllocation);
            }

            xmlSchemaSetParserStructuredErrors(parser_ctxt, Some(collect_structured_error), sink);
            let capture = GlobalErrorCapture::install(sink);
            let schema_ptr = xmlSchemaParse(parser_ctxt);
            drop(capture);

            xmlSchemaFreeParserCtxt(parser_ctxt);
            schema_ptr
        };

        let schema = if schema_ptr.is_null() {
            None
        } else {
            Some(unsafe { XmlSchemaPtr::from_raw(schema_ptr)? })
        };
        Ok(SchemaCompilation {
            schema,
            diagnostics,
        })
    }

    /// Validate a file against a compiled schema
    pub fn validate_file(
        &self,
        schema: &XmlSchemaPtr,
        file_path: &Path,
    ) -> LibXml2Result<ValidationResult> {
        let c_path = c_path(file_path)?;
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let sink = &mut diagnostics as *mut Vec<Diagnostic> as *mut c_void;

        let code = unsafe {
            let valid_ctxt = xmlSchemaNewValidCtxt(schema.as_ptr());
            if valid_ctxt.is_null() {
                return Err(LibXml2Error::ValidationContextCreationFailed);
            }

            xmlSchemaSetValidStructuredErrors(valid_ctxt, Some(collect_structured_error), sink);
            let capture = GlobalErrorCapture::install(sink);
            let code = xmlSchemaValidateFile(valid_ctxt, c_path.as_ptr(), 0);
            drop(capture);

            xmlSchemaFreeValidCtxt(valid_ctxt);
            code
        };

        Ok(ValidationResult { code, diagnostics })
    }

    /// Parse a file without a schema, reporting well-formedness problems only
    pub fn check_well_formed(&self, file_path: &Path) -> LibXml2Result<ValidationResult> {
        let c_path = c_path(file_path)?;
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        let sink = &mut diagnostics as *mut Vec<Diagnostic> as *mut c_void;

        let parsed = unsafe {
            let capture = GlobalErrorCapture::install(sink);
            let doc = xmlReadFile(c_path.as_ptr(), ptr::null(), XML_PARSE_NONET);
            drop(capture);

            let parsed = !doc.is_null();
            if parsed {
                xmlFreeDoc(doc);
            }
            parsed
        };

        let code = match (parsed, diagnostics.is_empty()) {
            (true, _) => 0,
            (false, false) => 1,
            (false, true) => -1,
        };
        Ok(ValidationResult { code, diagnostics })
    }
}

fn c_path(path: &Path) -> LibXml2Result<CString> {
    path.to_str()
        .and_then(|p| CString::new(p).ok())
        .ok_or_else(|| LibXml2Error::InvalidPath {
            path: path.to_path_buf(),
        })
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{MockResourceResolver, ResolvedResource};
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    const SIMPLE_XSD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
    <xs:element name="root" type="xs:string"/>
</xs:schema>"#;

    const VALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>Hello World</root>"#;

    const INVALID_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root><invalid>content</invalid></root>"#;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_schema_parsing_success() {
        let wrapper = LibXml2Wrapper::new();
        let compilation = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap();

        assert!(compilation.schema.unwrap().is_valid());
        assert!(compilation.diagnostics.is_empty());
    }

    #[test]
    fn test_schema_parsing_invalid_schema() {
        let wrapper = LibXml2Wrapper::new();
        let compilation = wrapper
            .parse_schema_from_memory(b"<invalid>not a schema</invalid>")
            .unwrap();

        assert!(compilation.schema.is_none());
        assert!(!compilation.diagnostics.is_empty());
    }

    #[test]
    fn test_validate_valid_and_invalid_files() {
        let temp_dir = TempDir::new().unwrap();
        let valid = write(&temp_dir, "valid.xml", VALID_XML);
        let invalid = write(&temp_dir, "invalid.xml", INVALID_XML);

        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap()
            .schema
            .unwrap();

        let result = wrapper.validate_file(&schema, &valid).unwrap();
        assert!(result.is_valid());
        assert!(result.diagnostics.is_empty());

        let result = wrapper.validate_file(&schema, &invalid).unwrap();
        assert!(result.is_invalid());
        assert_eq!(result.diagnostics.len(), 1);
        let diagnostic = &result.diagnostics[0];
        assert_eq!(diagnostic.severity, Severity::Error);
        assert_eq!(diagnostic.locator.line, Some(2));
    }

    #[test]
    fn test_well_formedness_check() {
        let temp_dir = TempDir::new().unwrap();
        let good = write(&temp_dir, "good.xml", "<doc><a/></doc>");
        let bad = write(&temp_dir, "bad.xml", "<doc><a></doc>");

        let wrapper = LibXml2Wrapper::new();
        let result = wrapper.check_well_formed(&good).unwrap();
        assert!(result.is_valid());
        assert!(result.diagnostics.is_empty());

        let result = wrapper.check_well_formed(&bad).unwrap();
        assert!(result.is_invalid());
        assert!(
            result
                .diagnostics
                .iter()
                .any(|d| d.severity == Severity::Fatal && d.locator.line == Some(1))
        );
    }

    #[test]
    fn test_imports_are_routed_through_the_resolver() {
        let temp_dir = TempDir::new().unwrap();
        let common = write(
            &temp_dir,
            "common.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                targetNamespace="urn:example:common">
                 <xs:simpleType name="code"><xs:restriction base="xs:string"/></xs:simpleType>
               </xs:schema>"#,
        );
        let main_xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
            xmlns:c="urn:example:common">
              <xs:import namespace="urn:example:common"
                         schemaLocation="http://schemas.example.com/common.xsd"/>
              <xs:element name="root" type="c:code"/>
            </xs:schema>"#;

        let mut resolver = MockResourceResolver::new();
        let target = common.clone();
        resolver
            .expect_resolve_schema_resource()
            .withf(|request| {
                request.system_id.as_deref() == Some("http://schemas.example.com/common.xsd")
            })
            .returning(move |_| {
                ResolvedResource::open(None, "file:///common.xsd".to_string(), target.clone())
                    .map(Some)
            });

        let wrapper = LibXml2Wrapper::new();
        let guard = ResolverGuard::install(Arc::new(resolver), LoadPurpose::Schema);
        let compilation = wrapper.parse_schema_from_memory(main_xsd.as_bytes()).unwrap();
        assert!(guard.take_failure().is_none());
        drop(guard);

        assert!(compilation.schema.is_some(), "{:?}", compilation.diagnostics);
    }

    #[test]
    fn test_known_import_locations_carry_their_namespace() {
        let temp_dir = TempDir::new().unwrap();
        let common = write(
            &temp_dir,
            "common.xsd",
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
                targetNamespace="urn:example:common">
                 <xs:simpleType name="code"><xs:restriction base="xs:string"/></xs:simpleType>
               </xs:schema>"#,
        );
        let main_xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
            xmlns:c="urn:example:common">
              <xs:import namespace="urn:example:common"
                         schemaLocation="http://schemas.example.invalid/common.xsd"/>
              <xs:element name="root" type="c:code"/>
            </xs:schema>"#;

        let mut resolver = MockResourceResolver::new();
        let target = common.clone();
        resolver
            .expect_resolve_schema_resource()
            .withf(|request| request.namespace_uri.as_deref() == Some("urn:example:common"))
            .returning(move |_| {
                ResolvedResource::open(None, "file:///common.xsd".to_string(), target.clone())
                    .map(Some)
            });

        let namespaces = HashMap::from([(
            "http://schemas.example.invalid/common.xsd".to_string(),
            "urn:example:common".to_string(),
        )]);
        let wrapper = LibXml2Wrapper::new();
        let guard = ResolverGuard::install_for_schema(Arc::new(resolver), namespaces);
        let compilation = wrapper.parse_schema_from_memory(main_xsd.as_bytes()).unwrap();
        assert!(guard.take_failure().is_none());
        drop(guard);

        assert!(compilation.schema.is_some(), "{:?}", compilation.diagnostics);
    }

    #[test]
    fn test_unresolved_remote_import_is_not_fetched() {
        let main_xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
            xmlns:c="urn:example:common">
              <xs:import namespace="urn:example:common"
                         schemaLocation="http://schemas.example.invalid/common.xsd"/>
              <xs:element name="root" type="c:code"/>
            </xs:schema>"#;

        let mut resolver = MockResourceResolver::new();
        resolver
            .expect_resolve_schema_resource()
            .returning(|_| Ok(None));

        let wrapper = LibXml2Wrapper::new();
        let _guard = ResolverGuard::install(Arc::new(resolver), LoadPurpose::Schema);
        let compilation = wrapper.parse_schema_from_memory(main_xsd.as_bytes()).unwrap();

        assert!(compilation.schema.is_none());
        assert!(!compilation.diagnostics.is_empty());
    }

    #[test]
    fn test_resolver_failure_is_parked_for_the_caller() {
        let main_xsd = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
              <xs:include schemaLocation="http://schemas.example.com/part.xsd"/>
            </xs:schema>"#;

        let mut resolver = MockResourceResolver::new();
        resolver.expect_resolve_schema_resource().returning(|_| {
            Err(ValidationError::Resolver {
                location: "file:///part.xsd".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        });

        let wrapper = LibXml2Wrapper::new();
        let guard = ResolverGuard::install(Arc::new(resolver), LoadPurpose::Schema);
        let _ = wrapper.parse_schema_from_memory(main_xsd.as_bytes()).unwrap();

        assert!(matches!(
            guard.take_failure(),
            Some(ValidationError::Resolver { .. })
        ));
        assert!(guard.take_failure().is_none());
    }

    #[test]
    fn test_guard_restores_previous_scope() {
        let outer = ResolverGuard::install(
            Arc::new(MockResourceResolver::new()),
            LoadPurpose::Document,
        );
        {
            let _inner = ResolverGuard::install(
                Arc::new(MockResourceResolver::new()),
                LoadPurpose::Schema,
            );
            let purpose = CURRENT_LOADER.with(|slot| slot.borrow().as_ref().map(|s| s.purpose));
            assert_eq!(purpose, Some(LoadPurpose::Schema));
        }
        let purpose = CURRENT_LOADER.with(|slot| slot.borrow().as_ref().map(|s| s.purpose));
        assert_eq!(purpose, Some(LoadPurpose::Document));
        drop(outer);
        assert!(CURRENT_LOADER.with(|slot| slot.borrow().is_none()));
    }

    #[test]
    fn test_local_reference_detection() {
        assert!(is_local_reference("/tmp/a.xsd"));
        assert!(is_local_reference("relative/a.xsd"));
        assert!(is_local_reference("file:///tmp/a.xsd"));
        assert!(!is_local_reference("http://example.com/a.xsd"));
        assert!(!is_local_reference("ftp://example.com/a.xsd"));
    }

    #[test]
    fn test_schema_ptr_cloning() {
        let wrapper = LibXml2Wrapper::new();
        let schema = wrapper
            .parse_schema_from_memory(SIMPLE_XSD.as_bytes())
            .unwrap()
            .schema
            .unwrap();
        let cloned_schema = schema.clone();

        assert_eq!(schema.as_ptr(), cloned_schema.as_ptr());
    }
}
