//! Native Ab3P engine, reached through the C wrapper library
//! (`create_ab3p`, `destroy_ab3p`, `add_text`, `get_abbrs`).
//!
//! The library is loaded at runtime so the rest of the workspace builds and
//! runs without it.

use libloading::{Library, Symbol};
use shared_types::{AbbreviationEngine, ExtractionError, RawAbbreviation, RawBatch};
use std::ffi::{c_char, c_double, c_int, c_void, CStr, CString};
use std::path::Path;

/// The wrapper writes every record it found, regardless of the buffer size it
/// was given, so the native buffer never shrinks below this many slots.
const NATIVE_SLOT_FLOOR: usize = 1024;

#[repr(C)]
struct CAbbrOut {
    sf: *const c_char,
    lf: *const c_char,
    strat: *const c_char,
    sf_offset: c_int,
    lf_offset: c_int,
    prec: c_double,
}

impl Default for CAbbrOut {
    fn default() -> Self {
        Self {
            sf: std::ptr::null(),
            lf: std::ptr::null(),
            strat: std::ptr::null(),
            sf_offset: 0,
            lf_offset: 0,
            prec: 0.0,
        }
    }
}

type CreateFn = unsafe extern "C" fn() -> *mut c_void;
type DestroyFn = unsafe extern "C" fn(*mut c_void);
type AddTextFn = unsafe extern "C" fn(*mut c_void, *const c_char);
type GetAbbrsFn = unsafe extern "C" fn(*mut c_void, *mut CAbbrOut, *mut c_int);

pub struct Ab3pEngine {
    instance: *mut c_void,
    add_text: AddTextFn,
    get_abbrs: GetAbbrsFn,
    destroy: DestroyFn,
    // Keeps the function pointers above valid; dropped last.
    _library: Library,
}

impl Ab3pEngine {
    pub fn load(library_path: &Path) -> Result<Self, ExtractionError> {
        let init_err = |e: libloading::Error| {
            ExtractionError::EngineInit(format!("{}: {}", library_path.display(), e))
        };

        // SAFETY: loading the wrapper runs its static initializers; the library
        // is a plain C ABI shim around Ab3P.
        let library = unsafe { Library::new(library_path) }.map_err(init_err)?;

        // SAFETY: signatures match CWrapper.h.
        let (create, destroy, add_text, get_abbrs) = unsafe {
            let create: Symbol<CreateFn> = library.get(b"create_ab3p\0").map_err(init_err)?;
            let destroy: Symbol<DestroyFn> = library.get(b"destroy_ab3p\0").map_err(init_err)?;
            let add_text: Symbol<AddTextFn> = library.get(b"add_text\0").map_err(init_err)?;
            let get_abbrs: Symbol<GetAbbrsFn> = library.get(b"get_abbrs\0").map_err(init_err)?;
            (*create, *destroy, *add_text, *get_abbrs)
        };

        // SAFETY: create_ab3p takes no arguments and returns an owned instance.
        let instance = unsafe { create() };
        if instance.is_null() {
            return Err(ExtractionError::EngineInit(
                "create_ab3p returned a null instance".to_string(),
            ));
        }

        Ok(Self {
            instance,
            add_text,
            get_abbrs,
            destroy,
            _library: library,
        })
    }
}

/// Copy a C string owned by the engine, `None` for null.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn copy_c_str(ptr: *const c_char) -> Option<Vec<u8>> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_bytes().to_vec())
    }
}

impl AbbreviationEngine for Ab3pEngine {
    fn add_text(&mut self, text: &str) -> Result<(), ExtractionError> {
        let text = CString::new(text)
            .map_err(|e| ExtractionError::Document(format!("text contains NUL byte: {}", e)))?;
        // SAFETY: instance is live until close; text outlives the call.
        unsafe { (self.add_text)(self.instance, text.as_ptr()) };
        Ok(())
    }

    fn fetch(&mut self, capacity: usize) -> Result<RawBatch, ExtractionError> {
        let slots = capacity.max(NATIVE_SLOT_FLOOR);
        let mut buffer: Vec<CAbbrOut> = (0..slots).map(|_| CAbbrOut::default()).collect();
        let mut count = c_int::try_from(slots).unwrap_or(c_int::MAX);

        // SAFETY: buffer holds `slots` initialized entries and count points to
        // a live c_int.
        unsafe { (self.get_abbrs)(self.instance, buffer.as_mut_ptr(), &mut count) };

        let readable = usize::try_from(count.max(0)).unwrap_or(0).min(capacity).min(slots);
        let records = buffer[..readable]
            .iter()
            .map(|out| unsafe {
                // SAFETY: not guaranteed. The wrapper fills sf/lf/strat from
                // `c_str()` of a vector it frees before returning, so these
                // may dangle. Reading them is an inherited ABI hazard; a bad
                // read only takes down the isolated worker process.
                RawAbbreviation {
                    short_form: copy_c_str(out.sf),
                    long_form: copy_c_str(out.lf),
                    strategy: copy_c_str(out.strat),
                    short_form_offset: out.sf_offset,
                    long_form_offset: out.lf_offset,
                    precision: out.prec,
                }
            })
            .collect();

        Ok(RawBatch {
            reported_count: i64::from(count),
            records,
        })
    }

    fn close(&mut self) -> Result<(), ExtractionError> {
        if self.instance.is_null() {
            return Ok(());
        }
        // SAFETY: instance came from create_ab3p and is released exactly once.
        unsafe { (self.destroy)(self.instance) };
        self.instance = std::ptr::null_mut();
        Ok(())
    }

    fn name(&self) -> &str {
        "ab3p"
    }
}

impl Drop for Ab3pEngine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
