//! Bindings for the arbitrary message bridge contracts.

use alloy::sol;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IAMB {
        /// Emitted by the home bridge when a user sends a message to the foreign chain.
        event UserRequestForSignature(bytes32 indexed messageId, bytes encodedData);
        /// Emitted by the foreign bridge when a user sends a message to the home chain.
        event UserRequestForAffirmation(bytes32 indexed messageId, bytes encodedData);
        /// Emitted by the foreign bridge once a home message has been executed.
        event RelayedMessage(address indexed sender, address indexed executor, bytes32 indexed messageId, bool status);
        /// Emitted by the home bridge once a foreign message has been executed.
        event AffirmationCompleted(address indexed sender, address indexed executor, bytes32 indexed messageId, bool status);

        function messagesSigned(bytes32 _message) external view returns (bool);
        function affirmationsSigned(bytes32 _hash) external view returns (bool);
        function validatorContract() external view returns (address);
    }

    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IBridgeValidators {
        function validatorList() external view returns (address[]);
        function requiredSignatures() external view returns (uint256);
    }
}
