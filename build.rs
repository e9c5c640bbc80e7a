use cfg_aliases::cfg_aliases;

fn main() {
    cfg_aliases! {
        // Bare-metal Cortex-M: the `nop` and `bkpt` instructions are real here.
        cortex_m_target: { all(target_arch = "arm", target_os = "none") },
        // The host register model is compiled in.
        sim: { feature = "sim" },
    }
}
