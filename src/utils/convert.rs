pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert lamports to SOL
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Convert SOL to lamports, rounding to the nearest lamport
pub fn sol_to_lamports(sol: f64) -> u64 {
    if !sol.is_finite() || sol <= 0.0 {
        return 0;
    }
    (sol * LAMPORTS_PER_SOL as f64).round() as u64
}

/// Signed lamport amount (PnL) to SOL
pub fn signed_lamports_to_sol(lamports: i64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sol_lamport_conversions() {
        assert_eq!(sol_to_lamports(0.001), 1_000_000);
        assert_eq!(sol_to_lamports(1.5), 1_500_000_000);
        assert_eq!(sol_to_lamports(-1.0), 0);
        assert_eq!(sol_to_lamports(f64::NAN), 0);
        assert_eq!(lamports_to_sol(2_500_000_000), 2.5);
        assert_eq!(signed_lamports_to_sol(-500_000_000), -0.5);
    }
}
