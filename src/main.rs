fn main() {
    if let Err(err) = notif_hud::run() {
        eprintln!("notif-hud: {err:#}");
        std::process::exit(1);
    }
}
