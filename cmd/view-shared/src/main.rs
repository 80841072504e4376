//! VPA Shared Segment Viewer
//!
//! Prints the shared segment: header, environment, active credential
//! slots, request counters and the last self-test run. The snapshot is
//! taken under the semaphore.
//!
//! Usage:
//!     view-shared              # dump (attaches, creating if absent)
//!     view-shared --remove     # mark the segment for removal
//!     view-shared --unlink     # unlink the named semaphore
//!
//! Key and semaphore name come from `VPA_SHM_KEY` and `VPA_MUTEX_NAME`.

use vpa_core::FuncCode;
use vpa_rpc::RpcConfig;
use vpa_shm::{NamedSemaphore, ShmLayout, SysvSegment, SystemStore};

const LINE: &str = "────────────────────────────────────────────────────────────";

fn main() {
    vpa_core::log::init();

    let config = RpcConfig::from_env();
    let result = match std::env::args().nth(1).as_deref() {
        None => dump(&config),
        Some("--remove") => remove(&config),
        Some("--unlink") => NamedSemaphore::unlink(&config.mutex_name).map(|()| {
            println!("semaphore {} unlinked", config.mutex_name);
        }),
        Some(_) => {
            eprintln!("usage: view-shared [--remove | --unlink]");
            std::process::exit(2);
        }
    };

    if let Err(e) = result {
        eprintln!("view-shared: {e}");
        std::process::exit(1);
    }
}

fn remove(config: &RpcConfig) -> vpa_shm::Result<()> {
    if SysvSegment::remove(config.shm_key)? {
        println!("segment {:#x} marked for removal", config.shm_key);
    } else {
        println!("no segment at {:#x}", config.shm_key);
    }
    Ok(())
}

fn section(name: &str) {
    println!("{LINE}");
    println!("  {name}");
    println!("{LINE}");
}

fn dump(config: &RpcConfig) -> vpa_shm::Result<()> {
    let store = SystemStore::open(config.shm_key, &config.mutex_name)?;
    let shm = store.snapshot()?;

    section("Segment");
    println!("  key           {:#x}", store.memory().key());
    println!("  id            {}", store.memory().id());
    println!("  attached      {}", store.memory().attach_count()?);
    println!("  created now   {}", store.created());
    println!("  signature     {:#010x}", shm.header.signature);
    println!("  layout        v{} ({} bytes)", shm.header.version, shm.header.size);
    println!("  token         {}", shm.token());

    print_environment(&shm);
    print_credentials(&shm);
    print_counters(&shm);
    print_selftest(&shm);
    Ok(())
}

fn print_environment(shm: &ShmLayout) {
    let env = shm.env.read();
    section("Environment");
    println!("  hostname      {}", env.hostname);
    println!("  ip            {}", env.ip);
    println!("  public ip     {}", env.public_ip);
    println!("  interface     {}", env.iface);
    println!("  protocol      {}", env.protocol);
    println!("  cgi root      {}", env.cgi_root);
    println!("  styles root   {}", env.styles_root);
    println!("  images root   {}", env.img_root);
}

fn print_credentials(shm: &ShmLayout) {
    section("Credentials");
    let mut any = false;
    for handle in shm.active_handles() {
        let Some(slot) = shm.active_slot(handle) else {
            continue;
        };
        let c = slot.read();
        any = true;
        println!(
            "  [{handle}] {:<12} {:<8} {} {}",
            c.username, c.auth_level, c.first_name, c.last_name
        );
        println!("      session {}", c.session_uuid);
        println!("      from    {} [{}] {}", c.remote_host, c.remote_addr, c.user_agent);
    }
    if !any {
        println!("  (none)");
    }
}

fn print_counters(shm: &ShmLayout) {
    let c = &shm.counters;
    section("Counters");
    println!("  requests          {}", c.requests);
    for func in (1..FuncCode::COUNT as u32).filter_map(FuncCode::from_u32) {
        println!("    {:<16}{}", func.name(), c.count(func));
    }
    println!("  auth failures     {}", c.auth_failures);
    println!("  protocol errors   {}", c.protocol_errors);
    println!("  unknown requests  {}", c.unknown_requests);
}

fn print_selftest(shm: &ShmLayout) {
    let t = &shm.selftest;
    section("Self-test");
    if t.started == 0 {
        println!("  never run");
        return;
    }
    println!("  started       {}", t.started_text());
    if t.completed == 0 {
        println!("  (in progress)");
    } else {
        println!("  completed     {}", t.completed_text());
        println!(
            "  overall       {}",
            if t.overall_passed != 0 { "PASS" } else { "FAIL" }
        );
    }
    println!(
        "  processed {}  passed {}  failed {}  skipped {}",
        t.num_processed, t.num_passed, t.num_failed, t.num_skipped
    );
    println!(
        "  bits  passed {:#010x}  failed {:#010x}  skipped {:#010x}",
        t.passed_bits, t.failed_bits, t.skipped_bits
    );
}
