//! Address derivation from output scripts.

use bitcoin::{Address, Network, Script};

/// Derive the textual address for a scriptPubKey, if it has one.
///
/// Encoding is delegated to the `bitcoin` crate, which applies the
/// standard payload slicing per template: Base58Check for p2pkh/p2sh,
/// Bech32 v0 for p2wpkh/p2wsh, Bech32m v1 for p2tr. Scripts with no
/// address form (OP_RETURN, bare pubkeys, non-standard) yield `None`;
/// a non-encodable script is a legitimate state, not an error.
pub fn derive_address(script_pubkey: &[u8], network: Network) -> Option<String> {
    let script = Script::from_bytes(script_pubkey);
    Address::from_script(script, network)
        .ok()
        .map(|address| address.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{op_return_script, p2pkh_script, p2sh_script, p2tr_script, p2wpkh_script, p2wsh_script};

    #[test]
    fn p2pkh_zero_hash_mainnet() {
        // The well-known burn address for a 20-byte zero hash.
        let mut script = vec![0x76, 0xA9, 0x14];
        script.extend_from_slice(&[0u8; 20]);
        script.extend_from_slice(&[0x88, 0xAC]);
        assert_eq!(
            derive_address(&script, Network::Bitcoin).as_deref(),
            Some("1111111111111111111114oLvT2")
        );
    }

    #[test]
    fn network_parameters_change_the_encoding() {
        let script = p2pkh_script(7);
        let mainnet = derive_address(&script, Network::Bitcoin).unwrap();
        let testnet = derive_address(&script, Network::Testnet).unwrap();
        assert_ne!(mainnet, testnet);
        assert!(mainnet.starts_with('1'));
        assert!(testnet.starts_with('m') || testnet.starts_with('n'));
    }

    #[test]
    fn segwit_outputs_use_bech32_prefixes() {
        assert!(derive_address(&p2wpkh_script(1), Network::Bitcoin)
            .unwrap()
            .starts_with("bc1q"));
        assert!(derive_address(&p2wsh_script(1), Network::Bitcoin)
            .unwrap()
            .starts_with("bc1q"));
        assert!(derive_address(&p2tr_script(1), Network::Bitcoin)
            .unwrap()
            .starts_with("bc1p"));
        assert!(derive_address(&p2wpkh_script(1), Network::Testnet)
            .unwrap()
            .starts_with("tb1q"));
    }

    #[test]
    fn p2sh_encodes_on_both_networks() {
        let script = p2sh_script(9);
        assert!(derive_address(&script, Network::Bitcoin).unwrap().starts_with('3'));
        assert!(derive_address(&script, Network::Testnet).unwrap().starts_with('2'));
    }

    #[test]
    fn unencodable_scripts_have_no_address() {
        assert_eq!(derive_address(&op_return_script(b"data"), Network::Bitcoin), None);
        assert_eq!(derive_address(&[0xAC], Network::Bitcoin), None);
        assert_eq!(derive_address(&[], Network::Bitcoin), None);
    }
}
