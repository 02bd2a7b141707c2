//! Solidity bindings for the token and CCTP v1 contracts.

use alloy::sol;

sol!(
    #[sol(all_derives = true, rpc)]
    interface IERC20 {
        function decimals() external view returns (uint8);
        function symbol() external view returns (string);
        function balanceOf(address account) external view returns (uint256);
        function allowance(address owner, address spender) external view returns (uint256);
        function transfer(address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }
);

sol!(
    #[sol(all_derives = true, rpc)]
    interface ITokenMessenger {
        function depositForBurn(
            uint256 amount,
            uint32 destinationDomain,
            bytes32 mintRecipient,
            address burnToken
        ) external returns (uint64 nonce);
    }
);

sol!(
    #[sol(all_derives = true, rpc)]
    interface IMessageTransmitter {
        event MessageSent(bytes message);

        function receiveMessage(bytes message, bytes attestation)
            external
            returns (bool success);
    }
);
