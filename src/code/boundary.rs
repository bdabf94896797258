//! Finds where a patch can end without cutting an instruction in half

use super::InstructionRecord;
use crate::error::{HookError, Result};

/// Returns the length of the shortest run of whole instructions covering at least `required` bytes.
///
/// Every instruction starting before `required` gets moved into the trampoline as-is, so none of
/// them may be a control transfer or address memory relative to itself.
pub fn compute_patch_size<I>(instructions: I, required: usize) -> Result<usize>
where
    I: IntoIterator<Item = InstructionRecord>,
{
    let mut size = 0;
    for instruction in instructions {
        if size >= required {
            break;
        }
        if instruction.is_control_transfer {
            return Err(HookError::BranchInPatchRegion { offset: size });
        }
        if instruction.is_ip_relative {
            return Err(HookError::IpRelativeInPatchRegion { offset: size });
        }
        size += instruction.length;
    }
    if size < required {
        return Err(HookError::InsufficientInstructions {
            available: size,
            required,
        });
    }
    Ok(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::InstructionRecord as R;

    #[test]
    /// Instructions ending exactly on the jump size
    fn test_exact_boundary() {
        let insts = [R::plain(1), R::plain(4), R::plain(2)];
        assert_eq!(compute_patch_size(insts, 5).unwrap(), 5);
    }

    #[test]
    /// The instruction crossing the jump size is taken whole
    fn test_straddling_instruction() {
        let insts = [R::plain(3), R::plain(7), R::plain(1)];
        assert_eq!(compute_patch_size(insts, 5).unwrap(), 10);
        assert_eq!(compute_patch_size(insts, 4).unwrap(), 10);
        assert_eq!(compute_patch_size(insts, 11).unwrap(), 11);
        assert!(matches!(
            compute_patch_size(insts, 14),
            Err(HookError::InsufficientInstructions {
                available: 11,
                required: 14
            })
        ));
    }

    #[test]
    /// A branch starting inside the patch area is rejected
    fn test_branch_in_patch() {
        let insts = [R::plain(2), R::branch(5), R::plain(8)];
        assert!(matches!(
            compute_patch_size(insts, 5),
            Err(HookError::BranchInPatchRegion { offset: 2 })
        ));
    }

    #[test]
    /// A branch right after the patch area does not matter
    fn test_branch_after_patch() {
        let insts = [R::plain(2), R::plain(3), R::branch(5)];
        assert_eq!(compute_patch_size(insts, 5).unwrap(), 5);
    }

    #[test]
    /// A branch as the very first instruction
    fn test_branch_first() {
        assert!(matches!(
            compute_patch_size([R::branch(5)], 5),
            Err(HookError::BranchInPatchRegion { offset: 0 })
        ));
    }

    #[test]
    /// IP-relative operands can't be moved without fixing them up
    fn test_ip_relative_in_patch() {
        let rip_load = InstructionRecord {
            length: 7,
            is_control_transfer: false,
            is_ip_relative: true,
        };
        assert!(matches!(
            compute_patch_size([R::plain(1), rip_load], 5),
            Err(HookError::IpRelativeInPatchRegion { offset: 1 })
        ));
    }

    #[test]
    /// Running out of instructions before the jump fits
    fn test_insufficient() {
        let insts = [R::plain(1), R::plain(2)];
        assert!(matches!(
            compute_patch_size(insts, 5),
            Err(HookError::InsufficientInstructions {
                available: 3,
                required: 5
            })
        ));
        assert!(matches!(
            compute_patch_size(Vec::<R>::new(), 5),
            Err(HookError::InsufficientInstructions { available: 0, .. })
        ));
    }

    #[test]
    /// The patch size always lands on an instruction boundary
    fn test_whole_instructions() {
        let insts = [R::plain(2), R::plain(6), R::plain(3), R::plain(15), R::plain(1)];
        let boundaries: Vec<usize> = insts
            .iter()
            .scan(0, |acc, r| {
                *acc += r.length;
                Some(*acc)
            })
            .collect();
        for required in 1..=26 {
            let size = compute_patch_size(insts, required).unwrap();
            assert!(size >= required);
            assert!(boundaries.contains(&size));
        }
    }
}
