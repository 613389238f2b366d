//! On-chain event schemas
//!
//! Marketplace listing lifecycle events and dshop product publications,
//! declared once here and decoded through `SolEvent`.

use alloy_sol_types::sol;

sol! {
    /// Emitted by the marketplace when a seller publishes a listing
    event ListingCreated(address indexed party, uint256 indexed listingID, bytes32 ipfsHash);

    /// Emitted when the listing's IPFS document is replaced
    event ListingUpdated(address indexed party, uint256 indexed listingID, bytes32 ipfsHash);

    /// Emitted when the seller takes the listing down
    event ListingWithdrawn(address indexed party, uint256 indexed listingID, bytes32 ipfsHash);

    /// Buyer offer on a listing; tracked by signature but not exported
    event OfferCreated(address indexed party, uint256 indexed listingID, uint256 indexed offerID, bytes32 ipfsHash);

    /// Emitted by a dshop for every product it publishes or edits
    event ProductPublished(
        uint256 indexed listingID,
        bytes32 indexed productID,
        string ipfsPath,
        string externalId,
        string parentExternalId,
        string title,
        string description,
        uint256 price,
        string currency,
        string option1,
        string option2,
        string option3,
        string image
    );
}
