//! Extra `Readable`/`Writeable` impls kept out of `lib.rs` for tidiness.

// Nothing beyond the impls already declared alongside `Reader`/`Writer`
// is needed at this crate's scope; this module exists so that future
// wire-format helper impls (e.g. for certificate types) have an obvious
// home, the way the teacher's `tor-bytes::impls` does.
