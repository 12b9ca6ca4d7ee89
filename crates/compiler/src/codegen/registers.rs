//! Register file and temporary pool.
//!
//! Register assignment follows the RISC-V psABI: `t0–t6` and `ft0–ft11`
//! are the expression-evaluation temporaries handed out by the pool,
//! `a0–a7`/`fa0–fa7` carry arguments and results, `s*`/`fs*` are preserved
//! across calls and only touched by prologue/epilogue code.

use super::CodeGenError;

/// An RV32GC register, printed with its assembler name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Zero,
    Ra,
    Sp,
    Gp,
    Fp,
    A(u8),
    T(u8),
    S(u8),
    Fa(u8),
    Ft(u8),
    Fs(u8),
}

impl Reg {
    pub fn is_float(self) -> bool {
        matches!(self, Reg::Fa(_) | Reg::Ft(_) | Reg::Fs(_))
    }
}

impl std::fmt::Display for Reg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reg::Zero => f.write_str("zero"),
            Reg::Ra => f.write_str("ra"),
            Reg::Sp => f.write_str("sp"),
            Reg::Gp => f.write_str("gp"),
            Reg::Fp => f.write_str("fp"),
            Reg::A(n) => write!(f, "a{}", n),
            Reg::T(n) => write!(f, "t{}", n),
            Reg::S(n) => write!(f, "s{}", n),
            Reg::Fa(n) => write!(f, "fa{}", n),
            Reg::Ft(n) => write!(f, "ft{}", n),
            Reg::Fs(n) => write!(f, "fs{}", n),
        }
    }
}

/// Number of integer temporaries (`t0–t6`).
pub const INT_TEMP_COUNT: usize = 7;
/// Number of floating temporaries (`ft0–ft11`).
pub const FLOAT_TEMP_COUNT: usize = 12;
/// Argument registers per bank (`a0–a7`, `fa0–fa7`).
pub const ARG_REG_COUNT: usize = 8;

/// Busy flags for the two temporary banks.
///
/// A register is busy from `acquire_*` until `release`. Rvalues that
/// merely borrow a register (loaded from a register-resident lvalue) are
/// never released here — the named variable owns the register.
#[derive(Debug, Default)]
pub struct RegisterPool {
    ints: [bool; INT_TEMP_COUNT],
    floats: [bool; FLOAT_TEMP_COUNT],
}

impl RegisterPool {
    pub fn new() -> Self {
        RegisterPool::default()
    }

    /// First free integer temporary.
    pub fn acquire_int(&mut self) -> Result<Reg, CodeGenError> {
        for (i, busy) in self.ints.iter_mut().enumerate() {
            if !*busy {
                *busy = true;
                return Ok(Reg::T(i as u8));
            }
        }
        Err(CodeGenError::Logic(
            "out of integer temporary registers".to_string(),
        ))
    }

    /// First free floating temporary.
    pub fn acquire_float(&mut self) -> Result<Reg, CodeGenError> {
        for (i, busy) in self.floats.iter_mut().enumerate() {
            if !*busy {
                *busy = true;
                return Ok(Reg::Ft(i as u8));
            }
        }
        Err(CodeGenError::Logic(
            "out of floating temporary registers".to_string(),
        ))
    }

    /// Marks one specific integer temporary busy. Fixed-register call
    /// protocols (the switch dispatch helpers) reserve their registers
    /// this way so expression evaluation cannot land on them.
    pub fn acquire_specific(&mut self, reg: Reg) -> Result<Reg, CodeGenError> {
        let Reg::T(n) = reg else {
            return Err(CodeGenError::Logic(format!(
                "{} is not a pool-managed temporary",
                reg
            )));
        };
        if self.ints[n as usize] {
            return Err(CodeGenError::Logic(format!("{} is already live", reg)));
        }
        self.ints[n as usize] = true;
        Ok(reg)
    }

    /// Frees a temporary. Registers outside the two temporary banks are
    /// ignored: they are not pool-managed.
    pub fn release(&mut self, reg: Reg) {
        match reg {
            Reg::T(n) => self.ints[n as usize] = false,
            Reg::Ft(n) => self.floats[n as usize] = false,
            _ => {}
        }
    }

    pub fn is_live(&self, reg: Reg) -> bool {
        match reg {
            Reg::T(n) => self.ints[n as usize],
            Reg::Ft(n) => self.floats[n as usize],
            _ => false,
        }
    }

    /// True when every temporary in both banks is free.
    pub fn all_free(&self) -> bool {
        !self.ints.iter().any(|b| *b) && !self.floats.iter().any(|b| *b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_free_scan() {
        let mut pool = RegisterPool::new();
        let t0 = pool.acquire_int().unwrap();
        let t1 = pool.acquire_int().unwrap();
        assert_eq!(t0, Reg::T(0));
        assert_eq!(t1, Reg::T(1));

        pool.release(t0);
        assert_eq!(pool.acquire_int().unwrap(), Reg::T(0));
        assert!(pool.is_live(t1));
    }

    #[test]
    fn test_banks_are_independent() {
        let mut pool = RegisterPool::new();
        let t = pool.acquire_int().unwrap();
        let ft = pool.acquire_float().unwrap();
        assert_eq!(ft, Reg::Ft(0));
        pool.release(t);
        assert!(pool.is_live(ft));
        assert!(!pool.is_live(t));
    }

    #[test]
    fn test_exhaustion_is_an_error() {
        let mut pool = RegisterPool::new();
        for _ in 0..INT_TEMP_COUNT {
            pool.acquire_int().unwrap();
        }
        assert!(pool.acquire_int().is_err());
    }

    #[test]
    fn test_acquire_specific() {
        let mut pool = RegisterPool::new();
        assert_eq!(pool.acquire_specific(Reg::T(1)).unwrap(), Reg::T(1));
        // The scan skips the reserved register.
        assert_eq!(pool.acquire_int().unwrap(), Reg::T(0));
        assert_eq!(pool.acquire_int().unwrap(), Reg::T(2));
        assert!(pool.acquire_specific(Reg::T(1)).is_err());
        assert!(pool.acquire_specific(Reg::A(0)).is_err());
    }

    #[test]
    fn test_release_ignores_unmanaged_registers() {
        let mut pool = RegisterPool::new();
        pool.release(Reg::A(0));
        pool.release(Reg::Fp);
        assert!(pool.all_free());
    }

    #[test]
    fn test_display_names() {
        assert_eq!(Reg::T(3).to_string(), "t3");
        assert_eq!(Reg::Fa(0).to_string(), "fa0");
        assert_eq!(Reg::Fs(11).to_string(), "fs11");
        assert_eq!(Reg::Zero.to_string(), "zero");
    }
}
