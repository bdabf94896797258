//! Hooks a small hand-assembled function and calls it through the hook and the trampoline.
//!
//! Run with `RUST_LOG=trace` to see the displaced instructions and the generated trampoline.

use jmphook::memory::ExecutableMemory;
use jmphook::{HookContext, JmpHook};
use region::Protection;

/// Signature of the hooked function
type AddOne = extern "C" fn(i32) -> i32;

/// `mov eax, <first argument>`
#[cfg(windows)]
const MOV_EAX_ARG: [u8; 2] = [0x89, 0xC8];
/// `mov eax, <first argument>`
#[cfg(not(windows))]
const MOV_EAX_ARG: [u8; 2] = [0x89, 0xF8];

/// Replacement for the hooked function
extern "C" fn times_ten(x: i32) -> i32 {
    x * 10
}

/// Writes `x + 1` with a frame pointer prologue into fresh read+execute memory
fn add_one() -> jmphook::Result<ExecutableMemory> {
    let mut code = vec![0x55, 0x48, 0x89, 0xE5]; // push rbp; mov rbp, rsp
    code.extend_from_slice(&MOV_EAX_ARG);
    code.extend_from_slice(&[0x0F, 0x1F, 0x44, 0x00, 0x00]); // nop
    code.extend_from_slice(&[0x0F, 0x1F, 0x44, 0x00, 0x00]); // nop
    code.extend_from_slice(&[0x83, 0xC0, 0x01, 0x5D, 0xC3]); // add eax, 1; pop rbp; ret
    code.resize(64, 0xCC);

    let mut mem = ExecutableMemory::allocate(code.len(), Protection::READ_WRITE)?;
    mem.write(&code)?;
    mem.set_protection(Protection::READ_EXECUTE)?;
    mem.flush_instruction_cache()?;
    Ok(mem)
}

fn main() -> jmphook::Result<()> {
    env_logger::init();

    if !cfg!(target_arch = "x86_64") {
        println!("this demo assembles x86-64 code");
        return Ok(());
    }

    let code = add_one()?;
    let target: AddOne = unsafe { std::mem::transmute(code.as_ptr()) };
    println!("before hook: add_one(1) = {}", target(1));

    let context = HookContext::host()?;
    let mut hook =
        unsafe { JmpHook::install(&context, code.as_ptr(), times_ten as AddOne as *const u8)? };
    let original: AddOne = unsafe { std::mem::transmute(hook.original()?) };
    println!(
        "hooked ({} bytes displaced): add_one(1) = {}, original(1) = {}",
        hook.patch_size(),
        target(1),
        original(1)
    );

    hook.close()?;
    println!("after close: add_one(1) = {}", target(1));
    Ok(())
}
