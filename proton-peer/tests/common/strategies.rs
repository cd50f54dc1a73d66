// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proptest Strategies

use proptest::prelude::*;
use proton_peer::{
    Operation, OperationRequest, OperationResponse, Reliability, ReturnCode, SendOptions,
};

pub fn operation_code_strategy() -> impl Strategy<Value = String> {
    prop_oneof!["[0-9]{1,4}", "[a-z][a-z_.]{0,23}"]
}

pub fn parameters_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..512)
}

pub fn request_strategy() -> impl Strategy<Value = OperationRequest> {
    (operation_code_strategy(), any::<u32>(), parameters_strategy()).prop_map(
        |(code, id, parameters)| OperationRequest {
            operation_code: code,
            request_id: id,
            parameters,
        },
    )
}

pub fn response_strategy() -> impl Strategy<Value = OperationResponse> {
    (
        operation_code_strategy(),
        any::<u32>(),
        any::<i16>(),
        proptest::option::of(".{0,40}"),
        parameters_strategy(),
    )
        .prop_map(|(code, id, rc, debug_message, parameters)| OperationResponse {
            operation_code: code,
            response_id: id,
            return_code: ReturnCode(rc),
            debug_message,
            parameters,
        })
}

pub fn operation_strategy() -> impl Strategy<Value = Operation> {
    prop_oneof![
        request_strategy().prop_map(Operation::Request),
        response_strategy().prop_map(Operation::Response),
    ]
}

pub fn reliability_strategy() -> impl Strategy<Value = Reliability> {
    prop_oneof![
        Just(Reliability::BestEffort),
        Just(Reliability::Reliable),
        Just(Reliability::Ordered),
    ]
}

/// Unencrypted send options.
pub fn plain_options_strategy() -> impl Strategy<Value = SendOptions> {
    reliability_strategy().prop_map(|r| SendOptions::new().reliability(r))
}
