//! Solidity interfaces for every call this crate encodes.

use alloy_sol_types::sol;

sol! {
    interface IRewardVault {
        function getReward(address account, address recipient) external returns (uint256);
    }

    interface IStakerPool {
        function getReward() external returns (uint256);
    }

    interface IDelegationHandler {
        function claim() external;
    }

    interface IERC20 {
        function approve(address spender, uint256 amount) external returns (bool);
    }

    /// Packed layout per entry:
    /// operation (1) | to (20) | value (32) | data length (32) | data
    interface IMultiSend {
        function multiSend(bytes transactions) external payable;
    }
}
