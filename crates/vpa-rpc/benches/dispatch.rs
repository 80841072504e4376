//! Dispatcher benchmarks over the in-memory segment.
//!
//! ```bash
//! cargo bench --package vpa-rpc --bench dispatch
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vpa_core::{AuthMsg, CredsMsg, LookupMsg, Message, WireMessage};
use vpa_rpc::{Dispatcher, MemoryCredentialStore, RequestContext};
use vpa_shm::MemoryStore;

const TOKEN: &str = "bench-token";

const PASSWD: &str = "\
meta
meta
active,username,password,authlevel,firstname,lastname,descr
true,doug,melange,admin,Douglas,Goodall,Site owner
";

fn bench_dispatch(c: &mut Criterion) {
    let d = Dispatcher::new(
        MemoryStore::in_memory_with_token(TOKEN),
        MemoryCredentialStore::from_csv(PASSWD),
        "X",
    );
    let ctx = RequestContext::local();
    d.dispatch(
        Message::Lookup(LookupMsg::request(TOKEN, "doug", "melange")),
        &ctx,
    );

    let auth = AuthMsg::request("X").encode();
    c.bench_function("handle_frame_get_auth", |b| {
        b.iter(|| d.handle_frame(black_box(&auth), &ctx))
    });

    let creds = CredsMsg::request(TOKEN, 3).encode();
    c.bench_function("handle_frame_creds", |b| {
        b.iter(|| d.handle_frame(black_box(&creds), &ctx))
    });

    c.bench_function("dispatch_lookup", |b| {
        b.iter(|| {
            d.dispatch(
                Message::Lookup(LookupMsg::request(TOKEN, "doug", black_box("melange"))),
                &ctx,
            )
        })
    });
}

criterion_group!(benches, bench_dispatch);
criterion_main!(benches);
