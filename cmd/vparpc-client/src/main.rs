//! VPA RPC Client
//!
//! Walks a server through the whole protocol: GET_AUTH, VERSION, URLS,
//! HOST2IPV4ADDR, and LOOKUP + CREDS when a user is given.
//!
//! Usage:
//!     vparpc-client [host] [service] [username password]
//!
//! Defaults come from `VPA_RPC_HOST`, `VPA_RPC_SERVICE` and `VPA_RPC_PSK`.
//!
//! Example:
//!     vparpc-client localhost vparpc doug melange

use vpa_rpc::{RpcClient, RpcConfig, VpaSession};

fn main() {
    vpa_core::log::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") || args.len() == 3 || args.len() > 4 {
        eprintln!("usage: vparpc-client [host] [service] [username password]");
        std::process::exit(2);
    }

    let mut config = RpcConfig::from_env();
    if let Some(host) = args.first() {
        config = config.host(host.as_str());
    }
    if let Some(service) = args.get(1) {
        config = config.service(service.as_str());
    }
    let login = match (args.get(2), args.get(3)) {
        (Some(u), Some(p)) => Some((u.as_str(), p.as_str())),
        _ => None,
    };

    if let Err(e) = run(&config, login) {
        eprintln!("vparpc-client: {e}");
        std::process::exit(1);
    }
}

fn run(config: &RpcConfig, login: Option<(&str, &str)>) -> vpa_rpc::Result<()> {
    config.validate()?;
    let client = RpcClient::from_config(config)?;
    println!("server        {}", client.addr());

    let mut session = VpaSession::new(client);
    let token = session.authenticate(&config.psk)?;
    println!("token         {token}");
    println!("version       {}", session.version()?);

    let urls = session.urls()?;
    println!("ip            {}", urls.ip);
    println!("cgi root      {}", urls.cgi_root);
    println!("styles root   {}", urls.styles_root);
    println!("{:<14}{}", config.host, session.host2ipv4(&config.host)?);

    if let Some((username, password)) = login {
        let handle = session.lookup(username, password)?;
        let cred = session.creds(handle)?;
        println!("handle        {handle}");
        println!("user          {} ({} {})", cred.username, cred.first_name, cred.last_name);
        println!("auth level    {}", cred.auth_level);
        println!("session       {}", cred.session_uuid);
        println!("remote        {} [{}]", cred.remote_host, cred.remote_addr);
        println!("user agent    {}", cred.user_agent);
    }
    Ok(())
}
