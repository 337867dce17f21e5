//! IR builder and register allocator (component C3).
//!
//! [`compile_function`] is the component's whole public contract: given a
//! typed [`cc_parse::Function`] and a target, produce an [`IrFunction`] with
//! every `VReg` assigned a register or spill slot.

mod block;
mod builder;
mod entity;
mod error;
mod func;
mod inst;
mod regalloc;
mod target;

pub use block::BasicBlock;
pub use entity::{Bb, Location, RegClass, VReg, VRegData};
pub use error::{IrError, Result};
pub use func::{FrameLayout, FuncFlags, IrFunction};
pub use inst::{CmpOp, Inst, Opcode};
pub use target::{bank_for, Aarch64Bank, RegisterBank, Riscv64Bank, Target, X86_64Bank};

use cc_interner::Interner;
use cc_parse::Function;

/// Lowers `f` to IR and runs register allocation.
pub fn compile_function(f: &Function, interner: &mut Interner, target: Target) -> Result<IrFunction> {
    let bank = bank_for(target);
    let mut func = builder::IrBuilder::new(interner, bank.as_ref(), target, f.name).build(f)?;
    regalloc::allocate(&mut func, bank.as_ref());
    regalloc::tweak_irs(&mut func);
    Ok(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cc_lex::{lex_file, PpConfig};
    use std::io::Write;

    fn compile_str(src: &str, target: Target) -> IrFunction {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("cc_ir_test_{:x}.c", src.len() as u32 ^ 0x1234abcd));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(src.as_bytes()).unwrap();
        let mut interner = Interner::new();
        let config = PpConfig { include_dirs: vec![], predefined: vec![] };
        let toks = lex_file(&path, &mut interner, config).unwrap();
        std::fs::remove_file(&path).ok();
        let (tu, _) = cc_parse::parse(&toks, &mut interner).unwrap();
        compile_function(&tu.functions[0], &mut interner, target).unwrap()
    }

    #[test]
    fn every_block_has_at_most_one_trailing_control_transfer() {
        let func = compile_str("int main(){int x=0;if(x)x=1;else x=2;return x;}", Target::X86_64);
        for bb in func.blocks.values() {
            assert!(bb.check_invariant());
        }
    }

    #[test]
    fn allocation_assigns_every_vreg_a_location() {
        let func = compile_str("int main(){int a=1;int b=2;return a+b;}", Target::X86_64);
        for data in func.vregs.values() {
            assert_ne!(data.location, Location::Unassigned);
        }
    }

    #[test]
    fn switch_lowers_to_compare_chain_or_table_without_panicking() {
        let func = compile_str(
            "int main(){int x=0;switch(1){case 1:x+=1;default:x+=10;}return x;}",
            Target::X86_64,
        );
        assert!(func.blocks.len() > 1);
    }

    #[test]
    fn variadic_function_rejected_on_aarch64() {
        let dir = std::env::temp_dir();
        let path = dir.join("cc_ir_test_variadic.c");
        std::fs::write(&path, "int f(int a, ...){return a;}").unwrap();
        let mut interner = Interner::new();
        let config = PpConfig { include_dirs: vec![], predefined: vec![] };
        let toks = lex_file(&path, &mut interner, config).unwrap();
        std::fs::remove_file(&path).ok();
        let (tu, _) = cc_parse::parse(&toks, &mut interner).unwrap();
        let err = compile_function(&tu.functions[0], &mut interner, Target::Aarch64);
        assert!(matches!(err, Err(IrError::UnsupportedOnTarget(_))));
    }

    #[test]
    fn loop_body_reaches_fixed_point_liveness() {
        let func = compile_str(
            "int main(){int s=0;int i=0;while(i<10){s=s+i;i=i+1;}return s;}",
            Target::X86_64,
        );
        assert!(func.blocks.len() >= 3);
    }
}
