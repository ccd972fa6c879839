//! Handler-script execution for document plugins.
//!
//! Every plugin ships a handler script (by convention `index.js`) that owns
//! the final say over the document's HTML. The handler is an external
//! process speaking JSON: it receives the document and the plugin's
//! effective config on stdin and returns either transformed HTML or, for
//! handlers that render themselves, the path of a finished PDF.
//!
//! # Protocol
//!
//! Input (JSON on stdin):
//! ```json
//! {"markdown": "# Doc", "html": "<h1>Doc</h1>", "config": {...}, "output_path": "/x/doc.pdf"}
//! ```
//!
//! Output (JSON on stdout), one of:
//! ```json
//! {"html": "<article>...</article>"}
//! {"pdf_path": "/x/doc.pdf"}
//! ```

pub mod runner;

pub use runner::{HandlerOutcome, HandlerRunner};
