//! VPA Wake Trigger
//!
//! Connects to a supervisor port on localhost, sends the wake payload and
//! hangs up. The supervisor starts whatever it has configured there.
//!
//! Usage:
//!     vpa-wake <port | name>
//!     vpa-wake --list
//!
//! Names: vpad-start, netstat, ip, curl, http, https, ipcs.

use vpa_rpc::{wake, WakePort};

fn usage() -> ! {
    eprintln!("usage: vpa-wake <port | name>  (vpa-wake --list for names)");
    std::process::exit(2);
}

fn main() {
    vpa_core::log::init();

    let Some(arg) = std::env::args().nth(1) else {
        usage();
    };

    if arg == "--list" {
        for p in WakePort::ALL {
            println!("{:<12}{}", p.name(), p.port());
        }
        return;
    }

    let port = match arg.parse::<u16>() {
        Ok(port) => port,
        Err(_) => match WakePort::from_name(&arg) {
            Some(p) => p.port(),
            None => usage(),
        },
    };

    if let Err(e) = wake::trigger(port) {
        eprintln!("vpa-wake: port {port}: {e}");
        std::process::exit(1);
    }
}
